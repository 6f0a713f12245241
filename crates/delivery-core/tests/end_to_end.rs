//! Import, compile, sync and archive a test package end to end.

use std::sync::Arc;

use delivery_core::fakes::{
    FakeCompiler, FakePackageExporter, FakeTestImporter, RecordingCleanup, StaticImporterRegistry,
};
use delivery_core::ontology::DELIVERY_ASSEMBLY_CLASS;
use delivery_core::sync::RecordingErrorSink;
use delivery_core::{
    DeliveryCreatedEvent, FileReference, ImportAndCompileRequest, ImportAndCompileTask,
    MetadataPayload, MetadataSyncService, NoopProcessor, PackageArchiver, ResourceStore,
    ResourceUri, StoreItemService, StoreMetadataCompiler, TaskExecution, TaskWorker,
    UpdateDeliveryTask, WorkerConfig,
};
use delivery_state::fakes::{MemoryFileSystemRegistry, MemoryQueueDispatcher, MemoryResourceStore};

const TESTS: &str = "http://delivery.local/ontology.rdf#Tests";
const ITEMS: &str = "http://delivery.local/ontology.rdf#Items";

#[tokio::test]
async fn import_with_two_items_reaches_the_archive() {
    let store = Arc::new(
        MemoryResourceStore::new()
            .with_root_class(DELIVERY_ASSEMBLY_CLASS, "Assembled Delivery")
            .with_root_class(TESTS, "Tests")
            .with_root_class(ITEMS, "Items"),
    );
    let dispatcher = Arc::new(MemoryQueueDispatcher::new());
    let file_systems = Arc::new(MemoryFileSystemRegistry::new());
    let archive = file_systems.register("dataStore");

    let importer = Arc::new(FakeTestImporter::new(store.clone(), TESTS, ITEMS).with_items(2));
    let registry = Arc::new(StaticImporterRegistry::new().with_test_importer("qtiTest", importer));
    let import = ImportAndCompileTask::new(
        store.clone(),
        registry.clone(),
        Arc::new(FakeCompiler::new(store.clone())),
        Arc::new(RecordingCleanup::new(store.clone())),
    );
    let archiver = PackageArchiver::new(
        file_systems.clone(),
        Arc::new(FakePackageExporter::new(b"package".to_vec())),
        Arc::new(NoopProcessor),
    );
    let worker = TaskWorker::new(archiver, dispatcher.clone(), WorkerConfig::new("/unused"))
        .with_import_task(import)
        .with_update_task(UpdateDeliveryTask::new(store.clone()));
    let sink = Arc::new(RecordingErrorSink::new());
    let sync = MetadataSyncService::new(
        store.clone(),
        Arc::new(StoreMetadataCompiler::new(store.clone())),
        Arc::new(StoreItemService::new(store.clone())),
        dispatcher.clone(),
    )
    .with_error_sink(sink.clone());

    // 1. enqueue and run the import
    ImportAndCompileRequest::new("qtiTest", FileReference::new("uploads/physics.zip"))
        .with_class_labels(["GroupA", "GroupB"])
        .enqueue(&*dispatcher, &*registry)
        .await
        .unwrap();
    let queued = dispatcher.drain();
    let report = match worker.execute(&queued[0]).await {
        TaskExecution::Completed(report) => report,
        other => panic!("import did not complete: {:?}", other),
    };
    assert!(report.is_success());
    let delivery_uri = report.delivery_uri().expect("delivery-uri in report data");

    // 2. the delivery sits under root -> GroupA -> GroupB
    let delivery = store
        .get_resource(&ResourceUri::new(delivery_uri))
        .await
        .unwrap()
        .unwrap();
    let group_b = store.get_class(&delivery.class).await.unwrap();
    let group_a = store.get_class(group_b.parent.as_ref().unwrap()).await.unwrap();
    assert_eq!((group_a.label.as_str(), group_b.label.as_str()), ("GroupA", "GroupB"));
    assert_eq!(group_a.parent.as_ref().map(|p| p.as_str()), Some(DELIVERY_ASSEMBLY_CLASS));

    // 3. the creation event yields a sync task covering both items
    sync.process_event(&DeliveryCreatedEvent::new(delivery_uri))
        .await
        .expect("sync task dispatched");
    assert!(sink.entries().is_empty());
    let queued = dispatcher.drain();
    let payload = MetadataPayload::from_params(queued[0].parameters()).unwrap();
    assert_eq!(payload.item_meta_data.len(), 2);

    // 4. running it archives the package
    assert_eq!(worker.execute(&queued[0]).await.label(), "completed");
    let expected = format!("{}-/QTIPackage.zip", urlencoding::encode(delivery_uri));
    assert_eq!(archive.paths(), vec![expected]);
}
