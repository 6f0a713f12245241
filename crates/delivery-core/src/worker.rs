//! Queue worker: routes task descriptors to their pipelines.
//!
//! Report-producing tasks (import-and-compile, update) always complete with
//! a report. Archive tasks propagate their errors here, where they are
//! classified as retryable or final. Metadata sync follow-ups reschedule
//! themselves with an incremented `count` until the retry budget is spent.

use std::sync::Arc;
use std::time::Instant;

use delivery_state::{QueueDispatcher, TaskDescriptor, TaskId};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::archive::{PackageArchiver, PersistRequest, RemoveRequest, PERSIST_ACTION, REMOVE_ACTION};
use crate::config::WorkerConfig;
use crate::domain::{DeliveryError, Report, Result};
use crate::metrics::METRICS;
use crate::obs::{self, TaskSpan};
use crate::sync::{MetadataPayload, METADATA_SYNC_ACTION};
use crate::tasks::import_and_compile::IMPORT_AND_COMPILE_ACTION;
use crate::tasks::update_delivery::UPDATE_DELIVERY_ACTION;
use crate::tasks::{ImportAndCompileTask, UpdateDeliveryTask};

/// What the queue should do after one execution.
#[derive(Debug)]
pub enum TaskExecution {
    /// Done; the report may still describe a business failure
    Completed(Report),
    /// A follow-up task was queued in place of this one
    Rescheduled {
        task: TaskId,
        attempt: u32,
        error: DeliveryError,
    },
    /// Transient failure; run the same task again
    Retry(DeliveryError),
    Failed(DeliveryError),
}

impl TaskExecution {
    pub fn label(&self) -> &'static str {
        match self {
            TaskExecution::Completed(_) => "completed",
            TaskExecution::Rescheduled { .. } => "rescheduled",
            TaskExecution::Retry(_) => "retry",
            TaskExecution::Failed(_) => "failed",
        }
    }

    pub fn report(&self) -> Option<&Report> {
        match self {
            TaskExecution::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DeliveryError> {
        match self {
            TaskExecution::Completed(_) => None,
            TaskExecution::Rescheduled { error, .. }
            | TaskExecution::Retry(error)
            | TaskExecution::Failed(error) => Some(error),
        }
    }

    fn from_result(result: Result<Report>) -> Self {
        match result {
            Ok(report) => TaskExecution::Completed(report),
            Err(error) if error.is_retryable() => TaskExecution::Retry(error),
            Err(error) => TaskExecution::Failed(error),
        }
    }
}

pub struct TaskWorker {
    archiver: PackageArchiver,
    dispatcher: Arc<dyn QueueDispatcher>,
    config: WorkerConfig,
    import: Option<ImportAndCompileTask>,
    update: Option<UpdateDeliveryTask>,
}

impl TaskWorker {
    pub fn new(
        archiver: PackageArchiver,
        dispatcher: Arc<dyn QueueDispatcher>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            archiver,
            dispatcher,
            config,
            import: None,
            update: None,
        }
    }

    pub fn with_import_task(mut self, task: ImportAndCompileTask) -> Self {
        self.import = Some(task);
        self
    }

    pub fn with_update_task(mut self, task: UpdateDeliveryTask) -> Self {
        self.update = Some(task);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Execute one task descriptor.
    pub async fn execute(&self, task: &TaskDescriptor) -> TaskExecution {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let _span = TaskSpan::enter(task.action(), &execution_id);
        let started = Instant::now();
        obs::emit_task_started(task.action(), task.title());

        let execution = self.route(task).await;

        match &execution {
            TaskExecution::Completed(report) if report.is_success() => {
                METRICS.inc_tasks_completed()
            }
            TaskExecution::Rescheduled { .. } => METRICS.inc_tasks_completed(),
            _ => METRICS.inc_tasks_failed(),
        }
        if let Some(error) = execution.error() {
            warn!(action = task.action(), error = %error, "task did not complete");
        }
        obs::emit_task_finished(
            task.action(),
            started.elapsed().as_millis() as u64,
            execution.label(),
        );
        execution
    }

    async fn route(&self, task: &TaskDescriptor) -> TaskExecution {
        let params = task.parameters();
        match task.action() {
            IMPORT_AND_COMPILE_ACTION => match &self.import {
                Some(pipeline) => TaskExecution::Completed(pipeline.run(params).await.into_report()),
                None => TaskExecution::Failed(unhandled(task.action())),
            },
            UPDATE_DELIVERY_ACTION => match &self.update {
                Some(pipeline) => TaskExecution::Completed(pipeline.run(params).await.into_report()),
                None => TaskExecution::Failed(unhandled(task.action())),
            },
            PERSIST_ACTION => TaskExecution::from_result(self.persist(params).await),
            REMOVE_ACTION => TaskExecution::from_result(self.remove(params).await),
            METADATA_SYNC_ACTION => self.sync(params).await,
            other => TaskExecution::Failed(DeliveryError::InconsistentData(format!(
                "unknown task action `{}`",
                other
            ))),
        }
    }

    async fn persist(&self, params: &Map<String, Value>) -> Result<Report> {
        let request = PersistRequest::from_params(params)?;
        let receipt = self.archiver.persist(&request).await?;
        Ok(Report::success(format!("package archived at {}", receipt.path))
            .with_data(json!({ "path": receipt.path, "packages": receipt.packages })))
    }

    async fn remove(&self, params: &Map<String, Value>) -> Result<Report> {
        let request = RemoveRequest::from_params(params)?;
        let removed = self.archiver.remove(&request).await?;
        let message = if removed {
            "archive removed"
        } else {
            "no archive to remove"
        };
        Ok(Report::success(message)
            .with_data(json!({ "path": request.archive_directory(), "removed": removed })))
    }

    async fn sync(&self, params: &Map<String, Value>) -> TaskExecution {
        let payload = match MetadataPayload::from_params(params) {
            Ok(payload) => payload,
            Err(error) => return TaskExecution::Failed(error),
        };
        let mut request = PersistRequest::new(
            &payload.delivery_id,
            &payload.test_uri,
            &self.config.file_system_id,
        );
        if let Some(tenant) = &self.config.tenant_id {
            request = request.with_tenant(tenant);
        }

        match self.archiver.persist(&request).await {
            Ok(receipt) => TaskExecution::Completed(
                Report::success(format!(
                    "delivery {} synced, package archived at {}",
                    payload.delivery_id, receipt.path
                ))
                .with_data(json!({ "path": receipt.path, "attempt": payload.count })),
            ),
            Err(error) if error.is_retryable() && payload.count < self.config.sync_max_retries => {
                let next = MetadataPayload {
                    count: payload.count + 1,
                    ..payload
                };
                match self.reschedule(&next).await {
                    Ok(task) => TaskExecution::Rescheduled {
                        task,
                        attempt: next.count,
                        error,
                    },
                    Err(dispatch_error) => {
                        warn!(error = %error, "sync failed and could not be rescheduled");
                        TaskExecution::Retry(dispatch_error)
                    }
                }
            }
            Err(error) => TaskExecution::Failed(error),
        }
    }

    async fn reschedule(&self, payload: &MetadataPayload) -> Result<TaskId> {
        Ok(self.dispatcher.create_task(payload.to_task()?).await?)
    }
}

fn unhandled(action: &str) -> DeliveryError {
    DeliveryError::InconsistentData(format!("no handler configured for `{}`", action))
}
