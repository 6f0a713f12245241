//! Lifecycle events observed by the metadata sync orchestrator.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Any event emitted by the surrounding system.
pub trait Event: Debug + Send + Sync {
    /// Stable event name, used in logs.
    fn name(&self) -> &'static str;

    /// The delivery capability, when this event has one.
    fn as_delivery_event(&self) -> Option<&dyn DeliveryEvent> {
        None
    }
}

/// Capability of events that concern a single delivery.
pub trait DeliveryEvent: Event {
    fn delivery_uri(&self) -> &str;
}

/// Emitted once compilation has produced a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCreatedEvent {
    pub delivery_uri: String,
}

impl DeliveryCreatedEvent {
    pub fn new(delivery_uri: impl Into<String>) -> Self {
        Self {
            delivery_uri: delivery_uri.into(),
        }
    }
}

impl Event for DeliveryCreatedEvent {
    fn name(&self) -> &'static str {
        "DeliveryCreatedEvent"
    }

    fn as_delivery_event(&self) -> Option<&dyn DeliveryEvent> {
        Some(self)
    }
}

impl DeliveryEvent for DeliveryCreatedEvent {
    fn delivery_uri(&self) -> &str {
        &self.delivery_uri
    }
}

/// Emitted after delivery properties were edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryUpdatedEvent {
    pub delivery_uri: String,
    pub changed_properties: Vec<String>,
}

impl Event for DeliveryUpdatedEvent {
    fn name(&self) -> &'static str {
        "DeliveryUpdatedEvent"
    }

    fn as_delivery_event(&self) -> Option<&dyn DeliveryEvent> {
        Some(self)
    }
}

impl DeliveryEvent for DeliveryUpdatedEvent {
    fn delivery_uri(&self) -> &str {
        &self.delivery_uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestImported;

    impl Event for TestImported {
        fn name(&self) -> &'static str {
            "TestImported"
        }
    }

    #[test]
    fn delivery_events_expose_uri() {
        let created = DeliveryCreatedEvent::new("http://x#d1");
        let event: &dyn Event = &created;
        assert_eq!(
            event.as_delivery_event().map(|e| e.delivery_uri()),
            Some("http://x#d1")
        );
    }

    #[test]
    fn other_events_lack_capability() {
        let event: &dyn Event = &TestImported;
        assert!(event.as_delivery_event().is_none());
    }
}
