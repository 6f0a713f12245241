//! Store-backed metadata compiler and test item lookup.

use std::sync::Arc;

use async_trait::async_trait;
use delivery_state::{ResourceStore, ResourceUri, StoreError};
use serde_json::{json, Value};

use crate::collaborators::{MetadataCompiler, TestItemService};
use crate::domain::{DeliveryError, Result};
use crate::ontology::TEST_ITEMS_PROPERTY;

/// Compiles `{uri, label, class, properties}` straight from the store.
pub struct StoreMetadataCompiler {
    store: Arc<dyn ResourceStore>,
}

impl StoreMetadataCompiler {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MetadataCompiler for StoreMetadataCompiler {
    async fn compile(&self, resource: &ResourceUri) -> Result<Value> {
        let found = self
            .store
            .get_resource(resource)
            .await?
            .ok_or_else(|| StoreError::ResourceNotFound {
                uri: resource.to_string(),
            })?;
        Ok(json!({
            "uri": found.uri,
            "label": found.label(),
            "class": found.class,
            "properties": found.properties,
        }))
    }
}

/// Reads a test's items from its items property (a URI or list of URIs).
pub struct StoreItemService {
    store: Arc<dyn ResourceStore>,
}

impl StoreItemService {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TestItemService for StoreItemService {
    async fn items(&self, test: &ResourceUri) -> Result<Vec<ResourceUri>> {
        let found = self
            .store
            .get_resource(test)
            .await?
            .ok_or_else(|| StoreError::ResourceNotFound {
                uri: test.to_string(),
            })?;
        match found.property(TEST_ITEMS_PROPERTY) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(uri)) => Ok(vec![ResourceUri::new(uri.as_str())]),
            Some(Value::Array(uris)) => uris
                .iter()
                .map(|v| {
                    v.as_str().map(ResourceUri::new).ok_or_else(|| {
                        DeliveryError::InconsistentData(format!(
                            "test {} lists a non-uri item: {}",
                            test, v
                        ))
                    })
                })
                .collect(),
            Some(other) => Err(DeliveryError::InconsistentData(format!(
                "test {} has malformed items: {}",
                test, other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delivery_state::fakes::MemoryResourceStore;

    const TESTS: &str = "http://delivery.local/ontology.rdf#Tests";

    #[tokio::test]
    async fn compiles_label_and_properties() {
        let store = Arc::new(MemoryResourceStore::new().with_root_class(TESTS, "Tests"));
        let test = store.create_resource(&TESTS.into(), "Math").await.unwrap();
        store
            .edit_property_values(&test.uri, "duration", json!(45))
            .await
            .unwrap();

        let doc = StoreMetadataCompiler::new(store.clone())
            .compile(&test.uri)
            .await
            .unwrap();
        assert_eq!(doc["label"], "Math");
        assert_eq!(doc["properties"]["duration"], 45);
        assert_eq!(doc["uri"], test.uri.as_str());
    }

    #[tokio::test]
    async fn missing_resource_fails() {
        let store = Arc::new(MemoryResourceStore::new());
        let err = StoreMetadataCompiler::new(store)
            .compile(&"http://nowhere#r".into())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Store(StoreError::ResourceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn items_accept_single_uri_or_list() {
        let store = Arc::new(MemoryResourceStore::new().with_root_class(TESTS, "Tests"));
        let service = StoreItemService::new(store.clone());
        let test = store.create_resource(&TESTS.into(), "Math").await.unwrap();
        assert!(service.items(&test.uri).await.unwrap().is_empty());

        store
            .edit_property_values(&test.uri, TEST_ITEMS_PROPERTY, json!("http://x#i1"))
            .await
            .unwrap();
        assert_eq!(service.items(&test.uri).await.unwrap().len(), 1);

        store
            .edit_property_values(
                &test.uri,
                TEST_ITEMS_PROPERTY,
                json!(["http://x#i1", "http://x#i2"]),
            )
            .await
            .unwrap();
        let items = service.items(&test.uri).await.unwrap();
        assert_eq!(items[1].as_str(), "http://x#i2");
    }
}
