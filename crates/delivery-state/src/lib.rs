//! Delivery-State: Storage Seams for Delivery Sync
//!
//! This crate provides the persistence layer the delivery pipelines act on.
//! Every backend here is externally owned: the pipelines never lock, they rely
//! on last-write-wins semantics and on idempotent archive operations.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: resource graph access, archival file storage, task dispatch.
//!
//! ## Key Components
//!
//! - `ResourceStore`: Classes, resources and property edits
//! - `ArchiveFileSystem`: Tenant-scoped package archives
//! - `QueueDispatcher`: At-least-once task queue
//! - `LocalFileSystem`: Disk-backed archive storage with atomic writes
//! - `MemoryQueueDispatcher`: In-process FIFO queue drained by a worker

mod error;
pub mod fakes;
mod local_fs;
mod queue;
mod schema;
pub mod storage_traits;

pub use error::StoreError;
pub use local_fs::{LocalFileSystem, LocalFileSystemRegistry};
pub use queue::MemoryQueueDispatcher;
pub use schema::{
    ClassNode, PropertyQuery, Resource, ResourceUri, TaskDescriptor, TaskId, LABEL_PROPERTY,
};
pub use storage_traits::{
    ArchiveFileSystem, FileSystemRegistry, QueueDispatcher, ResourceStore, StorageResult,
};
