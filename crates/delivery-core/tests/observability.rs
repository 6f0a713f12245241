//! Observability tests for delivery task lifecycle tracing.
//!
//! These tests verify that structured tracing events are emitted for task
//! start/finish, archive writes and removals, and sync failures.

use std::sync::Arc;

use delivery_core::fakes::{FakePackageExporter, RecordingProcessor};
use delivery_core::metrics::METRICS;
use delivery_core::obs::{
    emit_archive_removed, emit_archive_written, emit_compile_error, emit_sync_dispatched,
    emit_sync_failed, emit_task_finished, emit_task_started, TaskSpan,
};
use delivery_core::sync::ErrorSink;
use delivery_core::{
    DeliveryError, PackageArchiver, PersistRequest, TaskDescriptor, TaskWorker, TracingErrorSink,
    WorkerConfig,
};
use delivery_state::fakes::{MemoryFileSystemRegistry, MemoryQueueDispatcher};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_task_started_logs_action_and_title() {
    emit_task_started("delivery.update", "Update deliveries.");
    assert!(logs_contain("task.started"));
    assert!(logs_contain("Update deliveries."));
}

#[traced_test]
#[test]
fn test_emit_task_finished_logs_outcome() {
    emit_task_finished("delivery.package.persist", 12, "retry");
    assert!(logs_contain("task.finished"));
    assert!(logs_contain("retry"));
}

#[traced_test]
#[test]
fn test_emit_archive_events() {
    emit_archive_written("d1-acme/QTIPackage.zip", 2048, true);
    emit_archive_removed("d1-acme", false);
    assert!(logs_contain("archive.written"));
    assert!(logs_contain("archive.removed"));
}

#[traced_test]
#[test]
fn test_emit_sync_events() {
    emit_sync_dispatched("http://x#d1", 2, "task-1");
    emit_sync_failed("DeliveryCreatedEvent", &"store unavailable");
    emit_compile_error("http://x#t1", "missing item");
    assert!(logs_contain("sync.dispatched"));
    assert!(logs_contain("store unavailable"));
    assert!(logs_contain("compile.error"));
}

#[traced_test]
#[test]
fn test_task_span_enter_creates_span() {
    let span = TaskSpan::enter("delivery.update", "exec-1");
    tracing::info!("inside task");
    drop(span);
    assert!(logs_contain("delivery.task"));
}

#[traced_test]
#[test]
fn test_tracing_error_sink_counts_failures() {
    let before = METRICS.sync_failures();
    TracingErrorSink.report(
        "TestImportedEvent",
        &DeliveryError::EventTypeMismatch {
            event: "TestImportedEvent".into(),
        },
    );
    assert!(METRICS.sync_failures() > before);
    assert!(logs_contain("sync.failed"));
}

#[traced_test]
#[tokio::test]
async fn test_worker_emits_task_lifecycle() {
    let registry = Arc::new(MemoryFileSystemRegistry::new());
    registry.register("dataStore");
    let archiver = PackageArchiver::new(
        registry,
        Arc::new(FakePackageExporter::new(b"zip".to_vec())),
        Arc::new(RecordingProcessor::new()),
    );
    let worker = TaskWorker::new(
        archiver,
        Arc::new(MemoryQueueDispatcher::new()),
        WorkerConfig::new("/unused"),
    );
    let task = TaskDescriptor::new(
        "delivery.package.persist",
        PersistRequest::new("d1", "t1", "dataStore").to_params(),
        "Persist package",
    );

    let before = METRICS.archives_written();
    assert_eq!(worker.execute(&task).await.label(), "completed");

    assert!(METRICS.archives_written() > before);
    assert!(logs_contain("task.started"));
    assert!(logs_contain("archive.written"));
    assert!(logs_contain("task.finished"));
}
