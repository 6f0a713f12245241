//! Bulk property edits over every delivery matching a query.

use std::sync::Arc;

use delivery_state::{
    PropertyQuery, QueueDispatcher, ResourceStore, ResourceUri, TaskDescriptor, TaskId,
};
use serde_json::{json, Map, Value};
use tracing::info;

use super::{CleanupStatus, TaskOutcome};
use crate::domain::{DeliveryError, Report, Result, TaskParams, RESOURCE_DATA_KEY};
use crate::obs;
use crate::ontology::DELIVERY_ASSEMBLY_CLASS;

/// Queue action id.
pub const UPDATE_DELIVERY_ACTION: &str = "delivery.update";

pub const PARAM_WHERE: &str = "where";
pub const PARAM_PARAMETERS: &str = "parameters";

const TASK_NAME: &str = "UpdateDelivery";
const TASK_TITLE: &str = "Update deliveries.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateDeliveryRequest {
    pub filter: PropertyQuery,
    /// URI-encoded property key -> new value
    pub parameters: Map<String, Value>,
}

impl UpdateDeliveryRequest {
    pub fn new(filter: PropertyQuery) -> Self {
        Self {
            filter,
            parameters: Map::new(),
        }
    }

    pub fn set(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.parameters
            .insert(urlencoding::encode(property).into_owned(), value.into());
        self
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        let p = TaskParams::new(TASK_NAME, params);
        p.require(PARAM_WHERE)?;
        p.require(PARAM_PARAMETERS)?;
        Ok(Self {
            filter: PropertyQuery(p.object(PARAM_WHERE)?.into_iter().collect()),
            parameters: p.object(PARAM_PARAMETERS)?,
        })
    }

    pub fn to_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert(PARAM_WHERE.into(), json!(self.filter));
        params.insert(
            PARAM_PARAMETERS.into(),
            Value::Object(self.parameters.clone()),
        );
        params
    }

    pub async fn enqueue(&self, dispatcher: &dyn QueueDispatcher) -> Result<TaskId> {
        let task = TaskDescriptor::new(UPDATE_DELIVERY_ACTION, self.to_params(), TASK_TITLE);
        Ok(dispatcher.create_task(task).await?)
    }
}

/// Applies property edits to every matching delivery, recursively below the
/// delivery root class. Edits are not transactional across deliveries.
pub struct UpdateDeliveryTask {
    store: Arc<dyn ResourceStore>,
    delivery_root: ResourceUri,
}

impl UpdateDeliveryTask {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            delivery_root: ResourceUri::new(DELIVERY_ASSEMBLY_CLASS),
        }
    }

    pub fn with_delivery_root(mut self, root: impl Into<ResourceUri>) -> Self {
        self.delivery_root = root.into();
        self
    }

    pub async fn run(&self, params: &Map<String, Value>) -> TaskOutcome {
        let mut updated = Vec::new();
        match self.execute(params, &mut updated).await {
            Ok(report) => TaskOutcome::Completed(report),
            Err(error) => {
                let mut report = Report::failure(error.to_string());
                for uri in &updated {
                    report.add(updated_node(uri));
                }
                obs::emit_pipeline_failed(TASK_NAME, &error, "not_needed");
                TaskOutcome::Failed {
                    report,
                    error,
                    cleanup: CleanupStatus::NotNeeded,
                }
            }
        }
    }

    async fn execute(
        &self,
        params: &Map<String, Value>,
        updated: &mut Vec<ResourceUri>,
    ) -> Result<Report> {
        let request = UpdateDeliveryRequest::from_params(params)?;
        let edits = decode_keys(&request.parameters)?;

        let deliveries = self
            .store
            .search_instances(&self.delivery_root, &request.filter, true)
            .await?;

        let mut report = Report::success(format!("{} deliveries updated", deliveries.len()));
        for delivery in deliveries {
            for (property, value) in &edits {
                self.store
                    .edit_property_values(&delivery.uri, property, value.clone())
                    .await?;
            }
            report.add(updated_node(&delivery.uri));
            updated.push(delivery.uri);
        }
        info!(count = updated.len(), "deliveries updated");
        Ok(report)
    }
}

fn decode_keys(parameters: &Map<String, Value>) -> Result<Vec<(String, Value)>> {
    parameters
        .iter()
        .map(|(key, value)| {
            let property = urlencoding::decode(key).map_err(|e| {
                DeliveryError::InconsistentData(format!("undecodable property key `{}`: {}", key, e))
            })?;
            Ok((property.into_owned(), value.clone()))
        })
        .collect()
}

fn updated_node(uri: &ResourceUri) -> Report {
    Report::success(uri.as_str()).with_data(json!({ RESOURCE_DATA_KEY: uri.as_str() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_percent_decoded() {
        let mut params = Map::new();
        params.insert(
            "http%3A%2F%2Fwww.w3.org%2F2000%2F01%2Frdf-schema%23label".into(),
            json!("x"),
        );
        let decoded = decode_keys(&params).unwrap();
        assert_eq!(decoded[0].0, "http://www.w3.org/2000/01/rdf-schema#label");
    }

    #[test]
    fn request_set_encodes_key() {
        let request = UpdateDeliveryRequest::default().set("http://x.org/p#a", 1);
        assert!(request.parameters.contains_key("http%3A%2F%2Fx.org%2Fp%23a"));
    }

    #[test]
    fn both_keys_are_required() {
        let params = json!({ "where": {} }).as_object().cloned().unwrap();
        assert!(matches!(
            UpdateDeliveryRequest::from_params(&params),
            Err(DeliveryError::MissingParameter { .. })
        ));
    }
}
