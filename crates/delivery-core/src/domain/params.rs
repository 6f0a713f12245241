//! Typed access to task parameter maps.

use serde_json::{Map, Value};

use super::error::{DeliveryError, Result};

/// Borrowed view over a task's parameter map, tagged with the task name
/// used in `MissingParameter` errors.
#[derive(Debug, Clone, Copy)]
pub struct TaskParams<'a> {
    task: &'static str,
    params: &'a Map<String, Value>,
}

impl<'a> TaskParams<'a> {
    pub fn new(task: &'static str, params: &'a Map<String, Value>) -> Self {
        Self { task, params }
    }

    /// A present, non-null value.
    pub fn require(&self, name: &str) -> Result<&'a Value> {
        match self.params.get(name) {
            Some(Value::Null) | None => Err(DeliveryError::missing(name, self.task)),
            Some(v) => Ok(v),
        }
    }

    /// A present string value. Non-string scalars are rendered as text.
    pub fn require_str(&self, name: &str) -> Result<String> {
        match self.require(name)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(DeliveryError::InconsistentData(format!(
                "parameter `{}` in {} must be a scalar",
                name, self.task
            ))),
        }
    }

    /// A non-empty string value, `None` when absent, null or empty.
    pub fn optional_str(&self, name: &str) -> Option<&'a str> {
        self.params
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// An object value; absent or null yields an empty map.
    pub fn object(&self, name: &str) -> Result<Map<String, Value>> {
        match self.params.get(name) {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            // `[]` is accepted as an empty mapping.
            Some(Value::Array(items)) if items.is_empty() => Ok(Map::new()),
            Some(_) => Err(DeliveryError::InconsistentData(format!(
                "parameter `{}` in {} must be a mapping",
                name, self.task
            ))),
        }
    }

    /// A list of strings; absent or null yields an empty list.
    pub fn string_list(&self, name: &str) -> Result<Vec<String>> {
        match self.params.get(name) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        DeliveryError::InconsistentData(format!(
                            "parameter `{}` in {} must only hold strings",
                            name, self.task
                        ))
                    })
                })
                .collect(),
            Some(_) => Err(DeliveryError::InconsistentData(format!(
                "parameter `{}` in {} must be a list",
                name, self.task
            ))),
        }
    }

    /// An unsigned counter; absent yields zero.
    pub fn counter(&self, name: &str) -> u32 {
        self.params
            .get(name)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn require_treats_null_as_missing() {
        let m = map(json!({ "file": null }));
        let p = TaskParams::new("ImportAndCompile", &m);
        assert!(matches!(
            p.require("file"),
            Err(DeliveryError::MissingParameter { .. })
        ));
    }

    #[test]
    fn optional_str_skips_empty() {
        let m = map(json!({ "tenantId": "", "firstTenantId": "t1" }));
        let p = TaskParams::new("persist", &m);
        assert_eq!(p.optional_str("tenantId"), None);
        assert_eq!(p.optional_str("firstTenantId"), Some("t1"));
    }

    #[test]
    fn object_accepts_empty_list() {
        let m = map(json!({ "custom": [] }));
        let p = TaskParams::new("ImportAndCompile", &m);
        assert!(p.object("custom").unwrap().is_empty());
        assert!(p.object("absent").unwrap().is_empty());
    }

    #[test]
    fn string_list_rejects_non_strings() {
        let m = map(json!({ "labels": ["a", 1] }));
        let p = TaskParams::new("ImportAndCompile", &m);
        assert!(matches!(
            p.string_list("labels"),
            Err(DeliveryError::InconsistentData(_))
        ));
    }

    #[test]
    fn counter_defaults_to_zero() {
        let m = map(json!({ "count": 2 }));
        let p = TaskParams::new("sync", &m);
        assert_eq!(p.counter("count"), 2);
        assert_eq!(p.counter("missing"), 0);
    }
}
