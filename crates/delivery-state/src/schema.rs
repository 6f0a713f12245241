//! Record types shared by the store, filesystem and queue seams.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property URI holding a resource or class label.
pub const LABEL_PROPERTY: &str = "http://www.w3.org/2000/01/rdf-schema#label";

/// URI-like identifier of a resource or class in the graph store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceUri(pub String);

impl ResourceUri {
    pub fn new(uri: impl Into<String>) -> Self {
        ResourceUri(uri.into())
    }

    /// Mint a fresh URI under `namespace` (e.g. `http://example.org/ns`).
    pub fn generate(namespace: &str) -> Self {
        ResourceUri(format!("{}#i{}", namespace, uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceUri {
    fn from(s: &str) -> Self {
        ResourceUri(s.to_string())
    }
}

impl From<String> for ResourceUri {
    fn from(s: String) -> Self {
        ResourceUri(s)
    }
}

/// An instance in the graph store (test, item, delivery...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub uri: ResourceUri,
    /// Class the resource is a direct instance of
    pub class: ResourceUri,
    /// Property URI -> value (scalar or array)
    pub properties: BTreeMap<String, Value>,
}

impl Resource {
    /// Label stored under [`LABEL_PROPERTY`], empty when unset.
    pub fn label(&self) -> &str {
        self.properties
            .get(LABEL_PROPERTY)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn property(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }
}

/// A node of the label-addressed class hierarchy.
///
/// Siblings never share a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassNode {
    pub uri: ResourceUri,
    pub label: String,
    /// `None` only for a root class
    pub parent: Option<ResourceUri>,
}

/// Structural, exact-match query over resource properties.
///
/// Every entry must hold for a resource to match. A scalar value must equal
/// the stored value; an array value matches when the stored value equals any
/// element. An empty query matches every resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyQuery(pub BTreeMap<String, Value>);

impl PropertyQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(property.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `resource` satisfies every condition.
    pub fn matches(&self, resource: &Resource) -> bool {
        self.0.iter().all(|(property, expected)| {
            let Some(actual) = resource.properties.get(property) else {
                return false;
            };
            match expected {
                Value::Array(options) => options.iter().any(|o| o == actual),
                other => other == actual,
            }
        })
    }
}

/// Identifier handed back by a dispatcher for an enqueued task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        TaskId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work for the queue: action id, parameters and a title.
///
/// Immutable once built; the dispatcher takes ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    action: String,
    #[serde(default)]
    parameters: Map<String, Value>,
    #[serde(default)]
    title: String,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl TaskDescriptor {
    pub fn new(
        action: impl Into<String>,
        parameters: Map<String, Value>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            parameters,
            title: title.into(),
            created_at: Utc::now(),
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
