//! Update-delivery pipeline tests.

use std::sync::Arc;

use delivery_core::ontology::DELIVERY_ASSEMBLY_CLASS;
use delivery_core::{
    DeliveryError, ResourceStore, ResourceUri, TaskOutcome, UpdateDeliveryRequest,
    UpdateDeliveryTask,
};
use delivery_state::fakes::{MemoryQueueDispatcher, MemoryResourceStore};
use delivery_state::{PropertyQuery, LABEL_PROPERTY};
use serde_json::{json, Map, Value};

async fn store_with_deliveries(labels: &[&str]) -> (Arc<MemoryResourceStore>, Vec<ResourceUri>) {
    let store = Arc::new(
        MemoryResourceStore::new().with_root_class(DELIVERY_ASSEMBLY_CLASS, "Assembled Delivery"),
    );
    let root = ResourceUri::new(DELIVERY_ASSEMBLY_CLASS);
    let group = store.create_sub_class(&root, "GroupA").await.unwrap();
    let mut uris = Vec::new();
    for (n, label) in labels.iter().enumerate() {
        // odd deliveries live one class down
        let class = if n % 2 == 0 { &root } else { &group.uri };
        uris.push(store.create_resource(class, label).await.unwrap().uri);
    }
    (store, uris)
}

fn params(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap()
}

#[tokio::test]
async fn empty_filter_updates_every_delivery() {
    let (store, uris) = store_with_deliveries(&["d1", "d2", "d3"]).await;
    let task = UpdateDeliveryTask::new(store.clone());

    let outcome = task
        .run(&params(json!({ "where": {}, "parameters": { "label": "NewLabel" } })))
        .await;

    assert!(outcome.is_completed());
    let report = outcome.report();
    assert!(report.is_success());
    assert_eq!(report.message, "3 deliveries updated");
    let listed: Vec<&str> = report.children.iter().filter_map(|c| c.resource()).collect();
    for uri in &uris {
        assert!(listed.contains(&uri.as_str()));
        let delivery = store.get_resource(uri).await.unwrap().unwrap();
        assert_eq!(delivery.property("label"), Some(&json!("NewLabel")));
    }
}

#[tokio::test]
async fn filter_and_encoded_keys_are_honoured() {
    let (store, uris) = store_with_deliveries(&["keep", "change", "change"]).await;
    let request = UpdateDeliveryRequest::new(PropertyQuery::new().with(LABEL_PROPERTY, "change"))
        .set("http://x.org/p#maxExec", 5);

    let outcome = UpdateDeliveryTask::new(store.clone())
        .run(&request.to_params())
        .await;

    assert_eq!(outcome.report().children.len(), 2);
    let untouched = store.get_resource(&uris[0]).await.unwrap().unwrap();
    assert_eq!(untouched.property("http://x.org/p#maxExec"), None);
    let changed = store.get_resource(&uris[1]).await.unwrap().unwrap();
    assert_eq!(changed.property("http://x.org/p#maxExec"), Some(&json!(5)));
}

#[tokio::test]
async fn no_match_is_still_success() {
    let (store, _) = store_with_deliveries(&["d1"]).await;
    let request = UpdateDeliveryRequest::new(PropertyQuery::new().with(LABEL_PROPERTY, "none"))
        .set("label", "x");
    let outcome = UpdateDeliveryTask::new(store).run(&request.to_params()).await;
    assert!(outcome.report().is_success());
    assert!(outcome.report().children.is_empty());
}

#[tokio::test]
async fn missing_parameters_key_is_reported() {
    let (store, _) = store_with_deliveries(&["d1"]).await;
    let outcome = UpdateDeliveryTask::new(store)
        .run(&params(json!({ "where": {} })))
        .await;
    assert!(matches!(
        outcome.error(),
        Some(DeliveryError::MissingParameter { name, .. }) if name == "parameters"
    ));
    assert!(outcome.report().is_error());
}

#[tokio::test]
async fn store_failure_becomes_failure_report() {
    let store = Arc::new(
        MemoryResourceStore::new()
            .with_root_class(DELIVERY_ASSEMBLY_CLASS, "Assembled Delivery")
            .with_rejected_property("locked"),
    );
    store
        .create_resource(&ResourceUri::new(DELIVERY_ASSEMBLY_CLASS), "d1")
        .await
        .unwrap();

    let outcome = UpdateDeliveryTask::new(store)
        .run(&params(json!({ "where": {}, "parameters": { "locked": true } })))
        .await;

    match outcome {
        TaskOutcome::Failed { report, error, .. } => {
            assert!(matches!(error, DeliveryError::Store(_)));
            assert!(report.is_error());
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn enqueue_uses_update_title() {
    let dispatcher = MemoryQueueDispatcher::new();
    UpdateDeliveryRequest::new(PropertyQuery::new())
        .set("label", "x")
        .enqueue(&dispatcher)
        .await
        .unwrap();
    let tasks = dispatcher.tasks();
    assert_eq!(tasks[0].action(), "delivery.update");
    assert_eq!(tasks[0].title(), "Update deliveries.");
    assert!(tasks[0].parameters().contains_key("where"));
}
