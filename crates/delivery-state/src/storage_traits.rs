//! Storage trait definitions for Delivery Sync
//!
//! These traits define the externally owned collaborators the pipelines act on:
//! - `ResourceStore`: Semantic-graph store (classes, resources, properties)
//! - `ArchiveFileSystem`: Flat path-addressed archival storage
//! - `FileSystemRegistry`: Lookup of archival filesystems by id
//! - `QueueDispatcher`: At-least-once task queue
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::schema::{ClassNode, PropertyQuery, Resource, ResourceUri, TaskDescriptor, TaskId};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// ResourceStore — Semantic Graph
// ---------------------------------------------------------------------------

/// Semantic-graph resource store.
///
/// Guarantees:
/// - `sub_classes` returns direct children in creation order.
/// - `create_sub_class` never yields two siblings with the same label; when a
///   child with `label` already exists it is returned unchanged.
/// - Property edits are last-write-wins; no locking is implied.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Look up a class node. Returns `StoreError::ClassNotFound` if absent.
    async fn get_class(&self, uri: &ResourceUri) -> StorageResult<ClassNode>;

    /// Direct subclasses of `parent`, in creation order.
    async fn sub_classes(&self, parent: &ResourceUri) -> StorageResult<Vec<ClassNode>>;

    /// Create a direct subclass of `parent` labelled `label`.
    async fn create_sub_class(&self, parent: &ResourceUri, label: &str)
        -> StorageResult<ClassNode>;

    /// Create a resource as a direct instance of `class`.
    async fn create_resource(&self, class: &ResourceUri, label: &str) -> StorageResult<Resource>;

    /// Fetch a resource, `None` if it does not exist.
    async fn get_resource(&self, uri: &ResourceUri) -> StorageResult<Option<Resource>>;

    /// Replace every value of `property` on `resource` with `value`.
    async fn edit_property_values(
        &self,
        resource: &ResourceUri,
        property: &str,
        value: Value,
    ) -> StorageResult<()>;

    /// Instances of `class` (and of its descendants when `recursive`) that
    /// satisfy `query`.
    async fn search_instances(
        &self,
        class: &ResourceUri,
        query: &PropertyQuery,
        recursive: bool,
    ) -> StorageResult<Vec<Resource>>;

    /// Delete a resource. No-op if absent.
    async fn delete_resource(&self, uri: &ResourceUri) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// ArchiveFileSystem — Tenant-scoped archival storage
// ---------------------------------------------------------------------------

/// Path-addressed archival storage.
///
/// Paths are relative and `/`-separated. Semantics:
/// - `write` fails with `StoreError::FileExists` if the path is taken.
/// - `update` fails with `StoreError::FileNotFound` if the path is free.
/// - `has` is true for both files and directories.
/// - `delete_dir` removes a directory and everything below it.
#[async_trait]
pub trait ArchiveFileSystem: Send + Sync {
    async fn has(&self, path: &str) -> StorageResult<bool>;

    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    async fn write(&self, path: &str, contents: &[u8]) -> StorageResult<()>;

    async fn update(&self, path: &str, contents: &[u8]) -> StorageResult<()>;

    async fn delete_dir(&self, path: &str) -> StorageResult<()>;

    /// Every file path below `prefix` (recursive), sorted.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Resolves archival filesystems by id.
pub trait FileSystemRegistry: Send + Sync {
    /// Returns `StoreError::FileSystemNotFound` for unknown ids.
    fn file_system(&self, id: &str) -> StorageResult<Arc<dyn ArchiveFileSystem>>;
}

// ---------------------------------------------------------------------------
// QueueDispatcher — Task queue
// ---------------------------------------------------------------------------

/// Accepts task descriptors for eventual, at-least-once execution.
///
/// No ordering is guaranteed between independently dispatched tasks.
#[async_trait]
pub trait QueueDispatcher: Send + Sync {
    async fn create_task(&self, task: TaskDescriptor) -> StorageResult<TaskId>;
}
