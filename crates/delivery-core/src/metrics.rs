//! Global atomic counters for delivery worker observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. after draining a batch of tasks).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    archives_written: AtomicU64,
    sync_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            archives_written: AtomicU64::new(0),
            sync_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_tasks_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tasks_completed", "counter incremented");
    }

    pub fn inc_tasks_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tasks_failed", "counter incremented");
    }

    pub fn inc_archives_written(&self) {
        self.archives_written.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "archives_written", "counter incremented");
    }

    pub fn inc_sync_failures(&self) {
        self.sync_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sync_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            tasks_completed = self.tasks_completed(),
            tasks_failed = self.tasks_failed(),
            archives_written = self.archives_written(),
            sync_failures = self.sync_failures(),
        );
    }

    pub fn tasks_completed(&self) -> u64 {
        self.tasks_completed.load(Ordering::Relaxed)
    }

    pub fn tasks_failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }

    pub fn archives_written(&self) -> u64 {
        self.archives_written.load(Ordering::Relaxed)
    }

    pub fn sync_failures(&self) -> u64 {
        self.sync_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.tasks_completed.store(0, Ordering::Relaxed);
        self.tasks_failed.store(0, Ordering::Relaxed);
        self.archives_written.store(0, Ordering::Relaxed);
        self.sync_failures.store(0, Ordering::Relaxed);
    }
}
