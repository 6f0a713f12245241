//! Structured observability hooks for delivery task lifecycle events.
//!
//! This module provides:
//! - Task-scoped tracing spans via `TaskSpan` RAII guard
//! - Emission functions for task start/finish, archive writes and removals,
//!   metadata sync dispatch and failure, and compile errors
//!
//! Events are emitted at `info!` level, failures at `warn!`
//! (filter with the `DELIVERY_LOG` env var).

use tracing::{info, warn};

/// RAII guard that enters a task-scoped tracing span for the duration of a task.
///
/// # Example
///
/// ```ignore
/// let _span = TaskSpan::enter("delivery.package.persist", "3f2a...");
/// // every event below is tagged with action and task_id
/// ```
pub struct TaskSpan {
    _span: tracing::span::EnteredSpan,
}

impl TaskSpan {
    /// Create and enter a span tagged with the action id and task id.
    pub fn enter(action: &str, task_id: &str) -> Self {
        let span = tracing::info_span!("delivery.task", action = %action, task_id = %task_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a task began executing.
pub fn emit_task_started(action: &str, title: &str) {
    info!(event = "task.started", action = %action, title = %title);
}

/// Emit event: task finished with duration and outcome label
/// (`completed`, `failed`, `retry`, `rescheduled`).
pub fn emit_task_finished(action: &str, duration_ms: u64, outcome: &str) {
    info!(
        event = "task.finished",
        action = %action,
        duration_ms = duration_ms,
        outcome = %outcome,
    );
}

/// Emit event: a pipeline converted a failure into a report.
pub fn emit_pipeline_failed(task: &str, error: &dyn std::fmt::Display, cleanup: &str) {
    warn!(event = "pipeline.failed", task = %task, error = %error, cleanup = %cleanup);
}

/// Emit event: a package was archived.
pub fn emit_archive_written(path: &str, bytes: usize, overwritten: bool) {
    info!(
        event = "archive.written",
        path = %path,
        bytes = bytes,
        overwritten = overwritten,
    );
}

/// Emit event: an archive directory removal was requested.
pub fn emit_archive_removed(path: &str, existed: bool) {
    info!(event = "archive.removed", path = %path, existed = existed);
}

/// Emit event: follow-up metadata sync task dispatched.
pub fn emit_sync_dispatched(delivery_uri: &str, items: usize, task_id: &str) {
    info!(
        event = "sync.dispatched",
        delivery_uri = %delivery_uri,
        items = items,
        task_id = %task_id,
    );
}

/// Emit event: metadata sync failed for an event (warning level).
pub fn emit_sync_failed(event_name: &str, error: &dyn std::fmt::Display) {
    warn!(event = "sync.failed", source_event = %event_name, error = %error);
}

/// Emit event: compilation returned an error report (warning level).
pub fn emit_compile_error(test_uri: &str, message: &str) {
    warn!(event = "compile.error", test_uri = %test_uri, message = %message);
}
