//! Tenant-scoped archiving of exported test packages.
//!
//! Layout inside an archival filesystem:
//!
//! ```text
//! <urlencode(deliveryOrTestId)>-<tenantId>/QTIPackage.zip
//! ```
//!
//! `persist` overwrites, `remove` deletes if present; both are safe to replay
//! under at-least-once delivery. Errors propagate to the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use delivery_state::{ArchiveFileSystem, FileSystemRegistry, StoreError};
use globset::{Glob, GlobMatcher};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::collaborators::{ExportRequest, PackageExporter, PackageProcessor};
use crate::domain::{DeliveryError, Result, TaskParams};
use crate::metrics::METRICS;
use crate::obs;

/// Base file name of exported packages.
pub const PACKAGE_NAME: &str = "QTIPackage";
pub const PACKAGE_EXTENSION: &str = "zip";

/// Queue action ids.
pub const PERSIST_ACTION: &str = "delivery.package.persist";
pub const REMOVE_ACTION: &str = "delivery.package.remove";

pub const PARAM_DELIVERY_OR_TEST_ID: &str = "deliveryOrTestId";
pub const PARAM_TEST_URI: &str = "testUri";
pub const PARAM_FILE_SYSTEM_ID: &str = "fileSystemId";
pub const PARAM_TENANT_ID: &str = "tenantId";
pub const PARAM_FIRST_TENANT_ID: &str = "firstTenantId";

const PERSIST_TASK: &str = "PersistPackage";
const REMOVE_TASK: &str = "RemovePackage";
const EXPORT_DIR_PREFIX: &str = "package-export-";

/// Explicit tenant, else the first tenant, else the empty scope.
pub fn resolve_tenant(params: &Map<String, Value>) -> String {
    let p = TaskParams::new(PERSIST_TASK, params);
    p.optional_str(PARAM_TENANT_ID)
        .or_else(|| p.optional_str(PARAM_FIRST_TENANT_ID))
        .unwrap_or_default()
        .to_string()
}

/// Directory holding the archive of one delivery or test for one tenant.
pub fn archive_directory(delivery_or_test_id: &str, tenant_id: &str) -> String {
    format!("{}-{}", urlencoding::encode(delivery_or_test_id), tenant_id)
}

/// Canonical archive path.
pub fn archive_path(delivery_or_test_id: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}.{}",
        archive_directory(delivery_or_test_id, tenant_id),
        PACKAGE_NAME,
        PACKAGE_EXTENSION
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistRequest {
    pub delivery_or_test_id: String,
    pub test_uri: String,
    pub file_system_id: String,
    pub tenant_id: String,
    /// Full task parameters, handed to the post-export processor
    pub params: Map<String, Value>,
}

impl PersistRequest {
    pub fn new(
        delivery_or_test_id: impl Into<String>,
        test_uri: impl Into<String>,
        file_system_id: impl Into<String>,
    ) -> Self {
        let mut request = Self {
            delivery_or_test_id: delivery_or_test_id.into(),
            test_uri: test_uri.into(),
            file_system_id: file_system_id.into(),
            tenant_id: String::new(),
            params: Map::new(),
        };
        request.params = request.to_params();
        request
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self.params = self.to_params();
        self
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        let p = TaskParams::new(PERSIST_TASK, params);
        Ok(Self {
            delivery_or_test_id: p.require_str(PARAM_DELIVERY_OR_TEST_ID)?,
            test_uri: p.require_str(PARAM_TEST_URI)?,
            file_system_id: p.require_str(PARAM_FILE_SYSTEM_ID)?,
            tenant_id: resolve_tenant(params),
            params: params.clone(),
        })
    }

    pub fn to_params(&self) -> Map<String, Value> {
        let mut params = self.params.clone();
        params.insert(
            PARAM_DELIVERY_OR_TEST_ID.into(),
            Value::String(self.delivery_or_test_id.clone()),
        );
        params.insert(PARAM_TEST_URI.into(), Value::String(self.test_uri.clone()));
        params.insert(
            PARAM_FILE_SYSTEM_ID.into(),
            Value::String(self.file_system_id.clone()),
        );
        if !self.tenant_id.is_empty() {
            params.insert(PARAM_TENANT_ID.into(), Value::String(self.tenant_id.clone()));
        }
        params
    }

    pub fn archive_path(&self) -> String {
        archive_path(&self.delivery_or_test_id, &self.tenant_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveRequest {
    pub delivery_or_test_id: String,
    pub file_system_id: String,
    pub tenant_id: String,
}

impl RemoveRequest {
    pub fn new(delivery_or_test_id: impl Into<String>, file_system_id: impl Into<String>) -> Self {
        Self {
            delivery_or_test_id: delivery_or_test_id.into(),
            file_system_id: file_system_id.into(),
            tenant_id: String::new(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        let p = TaskParams::new(REMOVE_TASK, params);
        Ok(Self {
            delivery_or_test_id: p.require_str(PARAM_DELIVERY_OR_TEST_ID)?,
            file_system_id: p.require_str(PARAM_FILE_SYSTEM_ID)?,
            tenant_id: resolve_tenant(params),
        })
    }

    pub fn to_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert(
            PARAM_DELIVERY_OR_TEST_ID.into(),
            Value::String(self.delivery_or_test_id.clone()),
        );
        params.insert(
            PARAM_FILE_SYSTEM_ID.into(),
            Value::String(self.file_system_id.clone()),
        );
        if !self.tenant_id.is_empty() {
            params.insert(PARAM_TENANT_ID.into(), Value::String(self.tenant_id.clone()));
        }
        params
    }

    pub fn archive_directory(&self) -> String {
        archive_directory(&self.delivery_or_test_id, &self.tenant_id)
    }
}

/// What a successful `persist` stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub path: String,
    /// Number of exported packages archived (normally one)
    pub packages: usize,
}

pub struct PackageArchiver {
    file_systems: Arc<dyn FileSystemRegistry>,
    exporter: Arc<dyn PackageExporter>,
    processor: Arc<dyn PackageProcessor>,
}

impl PackageArchiver {
    pub fn new(
        file_systems: Arc<dyn FileSystemRegistry>,
        exporter: Arc<dyn PackageExporter>,
        processor: Arc<dyn PackageProcessor>,
    ) -> Self {
        Self {
            file_systems,
            exporter,
            processor,
        }
    }

    /// Export the test, process every package and create-or-update the
    /// archive entry. The export directory is removed on every exit path.
    pub async fn persist(&self, request: &PersistRequest) -> Result<ArchiveReceipt> {
        let fs = self.file_systems.file_system(&request.file_system_id)?;
        let export_dir = tempfile::Builder::new()
            .prefix(EXPORT_DIR_PREFIX)
            .tempdir()?;

        let result = self
            .export_and_store(request, fs.as_ref(), export_dir.path())
            .await;
        let export_path = export_dir.path().to_path_buf();
        let closed = export_dir.close();

        let receipt = result?;
        if let Err(e) = closed {
            warn!(dir = %export_path.display(), error = %e, "failed to remove export directory");
            return Err(e.into());
        }
        Ok(receipt)
    }

    /// Delete the tenant-scoped archive directory if present.
    ///
    /// Returns whether anything was removed.
    pub async fn remove(&self, request: &RemoveRequest) -> Result<bool> {
        let fs = self.file_systems.file_system(&request.file_system_id)?;
        let dir = request.archive_directory();
        let existed = fs.has(&dir).await.map_err(|e| archive_io(&dir, e))?;
        if existed {
            fs.delete_dir(&dir).await.map_err(|e| archive_io(&dir, e))?;
        }
        obs::emit_archive_removed(&dir, existed);
        Ok(existed)
    }

    async fn export_and_store(
        &self,
        request: &PersistRequest,
        fs: &dyn ArchiveFileSystem,
        export_dir: &Path,
    ) -> Result<ArchiveReceipt> {
        let export = ExportRequest {
            filename: PACKAGE_NAME.to_string(),
            test_uri: request.test_uri.clone(),
        };
        self.exporter.export(&export, export_dir).await?;

        let packages = exported_packages(export_dir).await?;
        if packages.is_empty() {
            warn!(test_uri = %request.test_uri, "export produced no package");
        }

        let path = request.archive_path();
        for package in &packages {
            self.processor.process(package, &request.params).await?;
            let contents = tokio::fs::read(package).await?;
            let overwritten = write_or_update(fs, &path, &contents).await?;
            obs::emit_archive_written(&path, contents.len(), overwritten);
            METRICS.inc_archives_written();
        }

        Ok(ArchiveReceipt {
            path,
            packages: packages.len(),
        })
    }
}

fn package_matcher() -> Result<GlobMatcher> {
    let pattern = format!("{}*.{}", PACKAGE_NAME, PACKAGE_EXTENSION);
    Glob::new(&pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| DeliveryError::InconsistentData(format!("bad package pattern: {}", e)))
}

/// Exported package files directly inside `dir`, sorted.
async fn exported_packages(dir: &Path) -> Result<Vec<PathBuf>> {
    let matcher = package_matcher()?;
    let mut packages = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() && matcher.is_match(entry.file_name()) {
            packages.push(entry.path());
        }
    }
    packages.sort();
    debug!(count = packages.len(), "exported packages found");
    Ok(packages)
}

/// Overwrite if present, write otherwise. Returns whether it overwrote.
async fn write_or_update(fs: &dyn ArchiveFileSystem, path: &str, contents: &[u8]) -> Result<bool> {
    if fs.has(path).await.map_err(|e| archive_io(path, e))? {
        fs.update(path, contents)
            .await
            .map_err(|e| archive_io(path, e))?;
        return Ok(true);
    }
    match fs.write(path, contents).await {
        Ok(()) => Ok(false),
        // Lost a race with a concurrent writer.
        Err(StoreError::FileExists { .. }) => {
            fs.update(path, contents)
                .await
                .map_err(|e| archive_io(path, e))?;
            Ok(true)
        }
        Err(e) => Err(archive_io(path, e)),
    }
}

fn archive_io(path: &str, source: StoreError) -> DeliveryError {
    DeliveryError::ArchiveIo {
        path: path.to_string(),
        source,
    }
}
