//! Delivery Sync Core Library
//!
//! Pipelines that turn imported tests into deliveries and keep their
//! metadata and packages in sync:
//!
//! - [`tasks::ImportAndCompileTask`]: import a package, compile a delivery
//! - [`tasks::UpdateDeliveryTask`]: bulk property edits over deliveries
//! - [`sync::MetadataSyncService`]: delivery events to metadata sync tasks
//! - [`archive::PackageArchiver`]: tenant-scoped package archives
//! - [`worker::TaskWorker`]: routes queued task descriptors to the above

pub mod archive;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod export;
pub mod fakes;
pub mod hierarchy;
pub mod metadata;
pub mod metrics;
pub mod obs;
pub mod ontology;
pub mod sync;
pub mod tasks;
pub mod telemetry;
pub mod worker;

pub use archive::{
    archive_directory, archive_path, resolve_tenant, ArchiveReceipt, PackageArchiver,
    PersistRequest, RemoveRequest,
};
pub use collaborators::{
    DeliveryCompiler, ExportRequest, FileReference, ImportCleanup, ImporterRegistry,
    MetadataCompiler, PackageExporter, PackageProcessor, RegisteredImporter, TestImporter,
    TestItemService,
};
pub use config::WorkerConfig;
pub use domain::{
    DeliveryCreatedEvent, DeliveryError, DeliveryEvent, DeliveryUpdatedEvent, Event, Report,
    ReportType, Result,
};
pub use export::{DirectoryPackageExporter, NoopProcessor};
pub use hierarchy::ClassResolver;
pub use metadata::{StoreItemService, StoreMetadataCompiler};
pub use sync::{ErrorSink, MetadataPayload, MetadataSyncService, TracingErrorSink};
pub use tasks::{
    CleanupStatus, ImportAndCompileRequest, ImportAndCompileTask, TaskOutcome,
    UpdateDeliveryRequest, UpdateDeliveryTask,
};
pub use worker::{TaskExecution, TaskWorker};

pub use delivery_state::{
    ArchiveFileSystem, FileSystemRegistry, LocalFileSystem, LocalFileSystemRegistry,
    QueueDispatcher, ResourceStore, ResourceUri, StoreError, TaskDescriptor, TaskId,
};
