//! Seams for the external services the pipelines delegate to.
//!
//! Each pipeline receives its collaborators through its constructor; nothing
//! is looked up from a global registry.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use delivery_state::{ClassNode, Resource, ResourceUri};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{DeliveryError, Report, Result};

/// Serialized reference to an uploaded package.
///
/// Accepts either a bare string (`"uploads/math.zip"`) or an object
/// `{"uri": "...", "name": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl FileReference {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
        }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(uri) if !uri.is_empty() => Ok(Self::new(uri.clone())),
            Value::Object(_) => Ok(serde_json::from_value(value.clone())?),
            other => Err(DeliveryError::InconsistentData(format!(
                "unsupported file reference: {}",
                other
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        match &self.name {
            None => Value::String(self.uri.clone()),
            Some(_) => serde_json::to_value(self).unwrap_or(Value::String(self.uri.clone())),
        }
    }

    /// Original file name, or the last path segment of the uri.
    pub fn basename(&self) -> &str {
        match &self.name {
            Some(name) => name,
            None => self.uri.rsplit('/').next().unwrap_or(&self.uri),
        }
    }
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Imports a test package into the graph store.
///
/// A successful report has one child per imported test whose data carries
/// the test URI under [`crate::domain::RESOURCE_DATA_KEY`].
#[async_trait]
pub trait TestImporter: Send + Sync {
    async fn import(&self, file: &FileReference) -> Result<Report>;
}

/// What an importer id resolves to.
#[derive(Clone)]
pub enum RegisteredImporter {
    /// An importer that produces tests
    Test(Arc<dyn TestImporter>),
    /// Any other importer kind (items, media...), unusable for compilation
    Other { kind: String },
}

impl std::fmt::Debug for RegisteredImporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisteredImporter::Test(_) => f.write_str("RegisteredImporter::Test"),
            RegisteredImporter::Other { kind } => write!(f, "RegisteredImporter::Other({kind})"),
        }
    }
}

/// Lookup of importers by id.
pub trait ImporterRegistry: Send + Sync {
    fn importer(&self, id: &str) -> Option<RegisteredImporter>;
}

/// Removes whatever a (possibly partial) import left behind.
#[async_trait]
pub trait ImportCleanup: Send + Sync {
    async fn clear_related_resources(&self, import_report: &Report) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compiles a test into a delivery resource.
///
/// The returned report's data names the delivery under
/// [`crate::domain::RESOURCE_DATA_KEY`] when one was produced.
#[async_trait]
pub trait DeliveryCompiler: Send + Sync {
    async fn compile(
        &self,
        destination: &ClassNode,
        test: &Resource,
        label: &str,
        assembly: Option<&ResourceUri>,
        custom: &Map<String, Value>,
    ) -> Result<Report>;
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Lists the items that make up a test.
#[async_trait]
pub trait TestItemService: Send + Sync {
    async fn items(&self, test: &ResourceUri) -> Result<Vec<ResourceUri>>;
}

/// Compiles a JSON metadata document for one resource.
#[async_trait]
pub trait MetadataCompiler: Send + Sync {
    async fn compile(&self, resource: &ResourceUri) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// Packaging
// ---------------------------------------------------------------------------

/// What to export and under which base file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub filename: String,
    pub test_uri: String,
}

/// Exports a test as a zip package into a directory.
///
/// Files written must be named `<filename>*.zip`.
#[async_trait]
pub trait PackageExporter: Send + Sync {
    async fn export(&self, request: &ExportRequest, destination: &Path) -> Result<()>;
}

/// Post-export step run on every package before it is archived.
#[async_trait]
pub trait PackageProcessor: Send + Sync {
    async fn process(&self, package: &Path, params: &Map<String, Value>) -> Result<()>;
}
