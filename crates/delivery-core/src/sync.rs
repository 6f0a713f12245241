//! Metadata sync orchestration for delivery lifecycle events.
//!
//! On a delivery event, compiles metadata for the delivery, its origin test
//! and every item of that test, then dispatches a follow-up sync task that
//! archives the test package. Failures never reach the caller: they are
//! logged and handed to an [`ErrorSink`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use delivery_state::{QueueDispatcher, ResourceStore, ResourceUri, StoreError, TaskDescriptor, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::collaborators::{MetadataCompiler, TestItemService};
use crate::domain::{DeliveryError, Event, Result, TaskParams};
use crate::metrics::METRICS;
use crate::obs;
use crate::ontology::DELIVERY_ORIGIN_PROPERTY;

/// Queue action id of the follow-up sync task.
pub const METADATA_SYNC_ACTION: &str = "delivery.metadata.sync";

/// Metadata handed to the follow-up sync task.
///
/// Serialized keys: `deliveryId`, `testUri`, `count`, `deliveryMetaData`,
/// `testMetaData`, `itemMetaData`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPayload {
    pub delivery_id: String,
    pub test_uri: String,
    /// Sync attempt counter, 0 on first dispatch
    pub count: u32,
    pub delivery_meta_data: Value,
    pub test_meta_data: Value,
    pub item_meta_data: BTreeMap<String, Value>,
}

impl MetadataPayload {
    pub fn to_params(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(DeliveryError::InconsistentData(
                "metadata payload is not a mapping".to_string(),
            )),
        }
    }

    /// Parses follow-up parameters; an absent `count` is a first attempt.
    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        let view = TaskParams::new("MetadataSync", params);
        view.require("deliveryId")?;
        view.require("testUri")?;
        let mut params = params.clone();
        params.insert("count".to_string(), Value::from(view.counter("count")));
        Ok(serde_json::from_value(Value::Object(params))?)
    }

    pub fn title(&self) -> String {
        format!("Continue try to sync of delivery \"{}\".", self.delivery_id)
    }

    pub fn to_task(&self) -> Result<TaskDescriptor> {
        Ok(TaskDescriptor::new(
            METADATA_SYNC_ACTION,
            self.to_params()?,
            self.title(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Error reporting
// ---------------------------------------------------------------------------

/// Structured channel for failures the orchestrator swallows.
pub trait ErrorSink: Send + Sync {
    fn report(&self, event: &str, error: &DeliveryError);
}

/// Default sink: a warn-level structured event plus a failure counter.
#[derive(Debug, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, event: &str, error: &DeliveryError) {
        obs::emit_sync_failed(event, error);
        METRICS.inc_sync_failures();
    }
}

/// Sink that keeps `(event, message)` pairs in memory.
#[derive(Debug, Default)]
pub struct RecordingErrorSink {
    entries: Mutex<Vec<(String, String)>>,
}

impl RecordingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl ErrorSink for RecordingErrorSink {
    fn report(&self, event: &str, error: &DeliveryError) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.push((event.to_string(), error.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct MetadataSyncService {
    store: Arc<dyn ResourceStore>,
    compiler: Arc<dyn MetadataCompiler>,
    items: Arc<dyn TestItemService>,
    dispatcher: Arc<dyn QueueDispatcher>,
    sink: Arc<dyn ErrorSink>,
}

impl MetadataSyncService {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        compiler: Arc<dyn MetadataCompiler>,
        items: Arc<dyn TestItemService>,
        dispatcher: Arc<dyn QueueDispatcher>,
    ) -> Self {
        Self {
            store,
            compiler,
            items,
            dispatcher,
            sink: Arc::new(TracingErrorSink),
        }
    }

    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Handle one event. Never fails; errors go to the sink.
    ///
    /// Returns the id of the dispatched follow-up task, if any.
    pub async fn process_event(&self, event: &dyn Event) -> Option<TaskId> {
        debug!(event = event.name(), "processing metadata event");
        match self.sync(event).await {
            Ok(task_id) => {
                debug!(event = event.name(), task_id = %task_id, "metadata event processed");
                Some(task_id)
            }
            Err(error) => {
                self.sink.report(event.name(), &error);
                None
            }
        }
    }

    async fn sync(&self, event: &dyn Event) -> Result<TaskId> {
        let delivery_uri = event
            .as_delivery_event()
            .map(|e| ResourceUri::new(e.delivery_uri()))
            .ok_or_else(|| DeliveryError::EventTypeMismatch {
                event: event.name().to_string(),
            })?;

        let payload = self.build_payload(&delivery_uri).await?;
        let item_count = payload.item_meta_data.len();
        let task_id = self.dispatcher.create_task(payload.to_task()?).await?;
        obs::emit_sync_dispatched(delivery_uri.as_str(), item_count, &task_id.to_string());
        Ok(task_id)
    }

    /// Compile the metadata payload for one delivery.
    pub async fn build_payload(&self, delivery_uri: &ResourceUri) -> Result<MetadataPayload> {
        let delivery = self
            .store
            .get_resource(delivery_uri)
            .await?
            .ok_or_else(|| StoreError::ResourceNotFound {
                uri: delivery_uri.to_string(),
            })?;
        let delivery_meta_data = self.compiler.compile(&delivery.uri).await?;

        let test_uri = delivery
            .property(DELIVERY_ORIGIN_PROPERTY)
            .and_then(Value::as_str)
            .map(ResourceUri::new)
            .ok_or_else(|| {
                DeliveryError::InconsistentData(format!(
                    "delivery {} has no origin test",
                    delivery.uri
                ))
            })?;
        let test_meta_data = self.compiler.compile(&test_uri).await?;

        let mut item_meta_data = BTreeMap::new();
        for item in self.items.items(&test_uri).await? {
            let doc = self.compiler.compile(&item).await?;
            item_meta_data.insert(item.0, doc);
        }

        Ok(MetadataPayload {
            delivery_id: delivery.uri.0,
            test_uri: test_uri.0,
            count: 0,
            delivery_meta_data,
            test_meta_data,
            item_meta_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> MetadataPayload {
        MetadataPayload {
            delivery_id: "http://x#d1".into(),
            test_uri: "http://x#t1".into(),
            count: 0,
            delivery_meta_data: json!({ "label": "Delivery of Math" }),
            test_meta_data: json!({ "label": "Math" }),
            item_meta_data: BTreeMap::from([("http://x#i1".to_string(), json!({}))]),
        }
    }

    #[test]
    fn payload_uses_camel_case_keys() {
        let params = payload().to_params().unwrap();
        for key in [
            "deliveryId",
            "testUri",
            "count",
            "deliveryMetaData",
            "testMetaData",
            "itemMetaData",
        ] {
            assert!(params.contains_key(key), "{key}");
        }
        assert_eq!(MetadataPayload::from_params(&params).unwrap(), payload());
    }

    #[test]
    fn payload_requires_delivery_and_test() {
        let mut params = payload().to_params().unwrap();
        params.remove("testUri");
        assert!(matches!(
            MetadataPayload::from_params(&params),
            Err(DeliveryError::MissingParameter { .. })
        ));
    }

    #[test]
    fn payload_without_count_is_first_attempt() {
        let mut params = payload().to_params().unwrap();
        params.remove("count");
        assert_eq!(MetadataPayload::from_params(&params).unwrap().count, 0);

        params.insert("count".into(), json!(2));
        assert_eq!(MetadataPayload::from_params(&params).unwrap().count, 2);
    }

    #[test]
    fn title_names_delivery() {
        assert_eq!(
            payload().title(),
            "Continue try to sync of delivery \"http://x#d1\"."
        );
    }

    #[test]
    fn recording_sink_keeps_entries() {
        let sink = RecordingErrorSink::new();
        sink.report(
            "TestImported",
            &DeliveryError::EventTypeMismatch {
                event: "TestImported".into(),
            },
        );
        assert_eq!(sink.entries().len(), 1);
        assert_eq!(sink.entries()[0].0, "TestImported");
    }
}
