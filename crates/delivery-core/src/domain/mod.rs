//! Domain models for Delivery Sync.
//!
//! Canonical definitions for the core entities:
//! - `Report`: Hierarchical outcome returned by every task
//! - `TaskParams`: Typed view over a task's parameter map
//! - `Event` / `DeliveryEvent`: Lifecycle events consumed by metadata sync
//! - `DeliveryError`: Error taxonomy shared by all pipelines

pub mod error;
pub mod event;
pub mod params;
pub mod report;

pub use error::{DeliveryError, Result};
pub use event::{DeliveryCreatedEvent, DeliveryEvent, DeliveryUpdatedEvent, Event};
pub use params::TaskParams;
pub use report::{Report, ReportType, DELIVERY_URI_DATA_KEY, RESOURCE_DATA_KEY};
