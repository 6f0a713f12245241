//! In-process task queue.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::schema::{TaskDescriptor, TaskId};
use crate::storage_traits::{QueueDispatcher, StorageResult};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process FIFO queue.
///
/// Accepted descriptors wait until a worker drains them; nothing runs them
/// on its own. `deliveryd` uses it to feed follow-up tasks back into the
/// same worker.
#[derive(Debug, Default)]
pub struct MemoryQueueDispatcher {
    tasks: Mutex<Vec<(TaskId, TaskDescriptor)>>,
    reject: Mutex<bool>,
}

impl MemoryQueueDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent `create_task` call.
    pub fn set_reject(&self, reject: bool) {
        *lock(&self.reject) = reject;
    }

    pub fn tasks(&self) -> Vec<TaskDescriptor> {
        lock(&self.tasks).iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.tasks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return queued descriptors, oldest first.
    pub fn drain(&self) -> Vec<TaskDescriptor> {
        lock(&self.tasks).drain(..).map(|(_, t)| t).collect()
    }
}

#[async_trait]
impl QueueDispatcher for MemoryQueueDispatcher {
    async fn create_task(&self, task: TaskDescriptor) -> StorageResult<TaskId> {
        if *lock(&self.reject) {
            return Err(StoreError::Dispatch(format!(
                "queue rejected task '{}'",
                task.action()
            )));
        }
        let id = TaskId::new();
        lock(&self.tasks).push((id.clone(), task));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[tokio::test]
    async fn drains_in_dispatch_order() {
        let queue = MemoryQueueDispatcher::new();
        for title in ["first", "second"] {
            queue
                .create_task(TaskDescriptor::new("delivery.update", Map::new(), title))
                .await
                .unwrap();
        }
        let drained = queue.drain();
        assert_eq!(drained[0].title(), "first");
        assert_eq!(drained[1].title(), "second");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn rejecting_queue_keeps_nothing() {
        let queue = MemoryQueueDispatcher::new();
        queue.set_reject(true);
        let err = queue
            .create_task(TaskDescriptor::new("delivery.update", Map::new(), "t"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Dispatch(_)));
        assert!(queue.is_empty());
    }
}
