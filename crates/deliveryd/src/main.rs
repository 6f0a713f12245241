//! Delivery Sync worker
//!
//! ## Commands
//!
//! - `persist`: export a test package and archive it for a delivery
//! - `remove`: delete the archive of a delivery
//! - `work`: execute a JSON-lines file of task descriptors
//!
//! Archives live below `--archive-root`, one directory per filesystem id.
//! Packages are exported from `--packages`, a directory of prebuilt zips.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use delivery_core::metrics::METRICS;
use delivery_core::{
    DirectoryPackageExporter, LocalFileSystemRegistry, NoopProcessor, PackageArchiver,
    PersistRequest, RemoveRequest, TaskDescriptor, TaskExecution, TaskWorker, WorkerConfig,
};
use delivery_state::MemoryQueueDispatcher;
use serde_json::json;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "deliveryd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Delivery Sync worker", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Root directory of the archival filesystems [default: $DELIVERY_ARCHIVE_ROOT]
    #[arg(long, global = true)]
    archive_root: Option<PathBuf>,

    /// Filesystem id archives are written to [default: $DELIVERY_FILESYSTEM_ID or dataStore]
    #[arg(long, global = true)]
    file_system: Option<String>,

    /// Tenant scope [default: $DELIVERY_TENANT_ID]
    #[arg(long, global = true)]
    tenant: Option<String>,

    /// Attempts a metadata sync follow-up may be rescheduled [default: $DELIVERY_SYNC_MAX_RETRIES or 3]
    #[arg(long, global = true)]
    sync_max_retries: Option<u32>,

    /// Directory of prebuilt test packages
    #[arg(long, global = true, env = "DELIVERY_PACKAGES_DIR", default_value = ".")]
    packages: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a test package and archive it
    Persist {
        /// Delivery or test identifier the archive is keyed by
        #[arg(long)]
        delivery: String,

        /// Test to export
        #[arg(long)]
        test: String,
    },

    /// Delete the archive of a delivery or test (no-op if absent)
    Remove {
        /// Delivery or test identifier the archive is keyed by
        #[arg(long)]
        delivery: String,
    },

    /// Execute task descriptors, one JSON object per line
    Work {
        /// JSON-lines file of task descriptors
        #[arg(long)]
        tasks: PathBuf,
    },
}

impl Cli {
    /// `DELIVERY_*` variables, overridden by flags.
    fn worker_config(&self) -> Result<WorkerConfig> {
        let base = match &self.archive_root {
            Some(root) => WorkerConfig::new(root).apply_env(),
            None => WorkerConfig::from_env(),
        };
        let mut config = base
            .map_err(anyhow::Error::msg)
            .context("Invalid worker configuration (set --archive-root or DELIVERY_ARCHIVE_ROOT)")?;
        if let Some(id) = &self.file_system {
            config = config.with_file_system_id(id);
        }
        if let Some(tenant) = &self.tenant {
            config = config.with_tenant_id(tenant);
        }
        if let Some(retries) = self.sync_max_retries {
            config = config.with_sync_max_retries(retries);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    delivery_core::telemetry::init_tracing(cli.json, level);

    let config = cli.worker_config()?;
    let archiver = archiver(&config, &cli.packages);

    let result = match &cli.command {
        Commands::Persist { delivery, test } => {
            cmd_persist(&archiver, &config, delivery, test).await
        }
        Commands::Remove { delivery } => cmd_remove(&archiver, &config, delivery).await,
        Commands::Work { tasks } => cmd_work(archiver, config, tasks).await,
    };
    METRICS.flush();
    result
}

fn archiver(config: &WorkerConfig, packages: &Path) -> PackageArchiver {
    PackageArchiver::new(
        Arc::new(LocalFileSystemRegistry::new(&config.archive_root)),
        Arc::new(DirectoryPackageExporter::new(packages)),
        Arc::new(NoopProcessor),
    )
}

async fn cmd_persist(
    archiver: &PackageArchiver,
    config: &WorkerConfig,
    delivery: &str,
    test: &str,
) -> Result<()> {
    let mut request = PersistRequest::new(delivery, test, &config.file_system_id);
    if let Some(tenant) = &config.tenant_id {
        request = request.with_tenant(tenant);
    }
    let receipt = archiver
        .persist(&request)
        .await
        .with_context(|| format!("Failed to archive package for {}", delivery))?;
    println!(
        "{}",
        json!({ "path": receipt.path, "packages": receipt.packages })
    );
    Ok(())
}

async fn cmd_remove(archiver: &PackageArchiver, config: &WorkerConfig, delivery: &str) -> Result<()> {
    let mut request = RemoveRequest::new(delivery, &config.file_system_id);
    if let Some(tenant) = &config.tenant_id {
        request = request.with_tenant(tenant);
    }
    let removed = archiver
        .remove(&request)
        .await
        .with_context(|| format!("Failed to remove archive for {}", delivery))?;
    println!(
        "{}",
        json!({ "path": request.archive_directory(), "removed": removed })
    );
    Ok(())
}

async fn cmd_work(archiver: PackageArchiver, config: WorkerConfig, tasks_path: &Path) -> Result<()> {
    let tasks = read_tasks(tasks_path)?;
    let queue = Arc::new(MemoryQueueDispatcher::new());
    let worker = TaskWorker::new(archiver, queue.clone(), config);

    let mut pending = tasks;
    let mut failed = 0usize;
    while !pending.is_empty() {
        for task in &pending {
            let execution = worker.execute(task).await;
            if matches!(execution, TaskExecution::Retry(_) | TaskExecution::Failed(_)) {
                failed += 1;
            }
            println!("{}", execution_line(task, &execution));
        }
        // follow-ups queued by rescheduled sync tasks
        pending = queue.drain();
    }

    info!(failed, "task file processed");
    if failed > 0 {
        anyhow::bail!("{} task(s) did not complete", failed);
    }
    Ok(())
}

fn read_tasks(path: &Path) -> Result<Vec<TaskDescriptor>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read task file: {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<TaskDescriptor>(line)
                .with_context(|| format!("Invalid task descriptor on line {}", n + 1))
        })
        .collect()
}

fn execution_line(task: &TaskDescriptor, execution: &TaskExecution) -> serde_json::Value {
    json!({
        "action": task.action(),
        "title": task.title(),
        "outcome": execution.label(),
        "report": execution.report(),
        "error": execution.error().map(|e| e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn worker_config_comes_from_flags() {
        let cli = Cli::parse_from([
            "deliveryd",
            "--archive-root",
            "/srv/archives",
            "--tenant",
            "acme",
            "--file-system",
            "archives",
            "--sync-max-retries",
            "7",
            "remove",
            "--delivery",
            "d1",
        ]);
        let config = cli.worker_config().unwrap();
        assert_eq!(config.archive_root, PathBuf::from("/srv/archives"));
        assert_eq!(config.tenant_id.as_deref(), Some("acme"));
        assert_eq!(config.file_system_id, "archives");
        assert_eq!(config.sync_max_retries, 7);
    }

    #[test]
    fn reads_json_lines_and_skips_blanks() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tasks.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"action":"delivery.package.remove","parameters":{"deliveryOrTestId":"d1","fileSystemId":"dataStore"}}"#,
                "\n\n",
                r#"{"action":"delivery.update","parameters":{"where":{},"parameters":{}},"title":"Update deliveries."}"#,
                "\n"
            ),
        )
        .unwrap();
        let tasks = read_tasks(&path).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].title(), "Update deliveries.");
    }

    #[tokio::test]
    async fn work_runs_remove_tasks_against_local_root() {
        let root = tempfile::TempDir::new().unwrap();
        let tasks = root.path().join("tasks.jsonl");
        std::fs::write(
            &tasks,
            r#"{"action":"delivery.package.remove","parameters":{"deliveryOrTestId":"d1","fileSystemId":"dataStore"}}"#,
        )
        .unwrap();
        let config = WorkerConfig::new(root.path().join("archives"));
        let archiver = archiver(&config, root.path());
        cmd_work(archiver, config, &tasks).await.unwrap();
    }
}
