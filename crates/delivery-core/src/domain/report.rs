//! Hierarchical task reports returned to queue callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which a report's data names the resource it produced.
pub const RESOURCE_DATA_KEY: &str = "resource";

/// Key under which a compile report's data names the new delivery.
pub const DELIVERY_URI_DATA_KEY: &str = "delivery-uri";

/// Severity of a report node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Success,
    Info,
    Warning,
    Error,
}

/// A report node: type, message, optional data and nested reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(rename = "type")]
    pub kind: ReportType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Report>,
}

impl Report {
    pub fn new(kind: ReportType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            children: Vec::new(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ReportType::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ReportType::Info, message)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(ReportType::Error, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn set_data(&mut self, data: Value) {
        self.data = Some(data);
    }

    pub fn add(&mut self, child: Report) {
        self.children.push(child);
    }

    pub fn is_success(&self) -> bool {
        self.kind == ReportType::Success
    }

    pub fn is_error(&self) -> bool {
        self.kind == ReportType::Error
    }

    /// Every error node in this tree (self included), depth first.
    pub fn errors(&self) -> Vec<&Report> {
        let mut out = Vec::new();
        self.collect_errors(&mut out);
        out
    }

    fn collect_errors<'a>(&'a self, out: &mut Vec<&'a Report>) {
        if self.is_error() {
            out.push(self);
        }
        for child in &self.children {
            child.collect_errors(out);
        }
    }

    /// Resource URIs named by the direct children's data, in order.
    pub fn child_resources(&self) -> Vec<String> {
        self.children
            .iter()
            .filter_map(|c| c.data.as_ref())
            .filter_map(|d| d.get(RESOURCE_DATA_KEY))
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    }

    /// Resource URI named by this node's own data.
    pub fn resource(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.get(RESOURCE_DATA_KEY))
            .and_then(Value::as_str)
    }

    /// `delivery-uri` attached to this node's data.
    pub fn delivery_uri(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.get(DELIVERY_URI_DATA_KEY))
            .and_then(Value::as_str)
    }
}
