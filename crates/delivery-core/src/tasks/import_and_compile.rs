//! Import a test package and compile it into a delivery.
//!
//! Pipeline, in order:
//! 1. validate `file` and `importer` are present
//! 2. resolve the importer; it must produce tests
//! 3. import the package
//! 4. resolve the destination class from `delivery-class-labels`
//! 5. compile `"Delivery of <test label>"` into that class
//! 6. a compile error report is logged, not fatal
//! 7. apply `custom` property overrides to the delivery
//! 8. merge the compile report and attach `delivery-uri`
//!
//! Any failure yields a failure report; resources from a partial import are
//! cleaned up and a cleanup failure is reported as its own error node.

use std::sync::Arc;

use delivery_state::{QueueDispatcher, ResourceStore, ResourceUri, StoreError, TaskDescriptor, TaskId};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::{CleanupStatus, TaskOutcome};
use crate::collaborators::{
    DeliveryCompiler, FileReference, ImportCleanup, ImporterRegistry, RegisteredImporter,
    TestImporter,
};
use crate::domain::{DeliveryError, Report, Result, TaskParams, DELIVERY_URI_DATA_KEY};
use crate::hierarchy::ClassResolver;
use crate::obs;
use crate::ontology::DELIVERY_ASSEMBLY_CLASS;

/// Queue action id.
pub const IMPORT_AND_COMPILE_ACTION: &str = "delivery.import_and_compile";

pub const PARAM_FILE: &str = "file";
pub const PARAM_IMPORTER: &str = "importer";
pub const PARAM_CUSTOM: &str = "custom";
pub const PARAM_DELIVERY_CLASS_LABELS: &str = "delivery-class-labels";

const TASK_NAME: &str = "ImportAndCompile";
const TASK_TITLE: &str = "Import QTI test and create delivery.";

/// Parsed task input.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportAndCompileRequest {
    pub file: FileReference,
    pub importer_id: String,
    pub custom: Map<String, Value>,
    pub delivery_class_labels: Vec<String>,
}

impl ImportAndCompileRequest {
    pub fn new(importer_id: impl Into<String>, file: FileReference) -> Self {
        Self {
            file,
            importer_id: importer_id.into(),
            custom: Map::new(),
            delivery_class_labels: Vec::new(),
        }
    }

    pub fn with_custom(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(property.into(), value.into());
        self
    }

    pub fn with_class_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.delivery_class_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Parse and validate required keys. Fails before any side effect.
    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        let p = TaskParams::new(TASK_NAME, params);
        let file = p.require(PARAM_FILE)?;
        let importer_id = p.require_str(PARAM_IMPORTER)?;
        Ok(Self {
            file: FileReference::from_value(file)?,
            importer_id,
            custom: p.object(PARAM_CUSTOM)?,
            delivery_class_labels: p.string_list(PARAM_DELIVERY_CLASS_LABELS)?,
        })
    }

    pub fn to_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert(PARAM_FILE.into(), self.file.to_value());
        params.insert(PARAM_IMPORTER.into(), Value::String(self.importer_id.clone()));
        params.insert(PARAM_CUSTOM.into(), Value::Object(self.custom.clone()));
        params.insert(
            PARAM_DELIVERY_CLASS_LABELS.into(),
            json!(self.delivery_class_labels),
        );
        params
    }

    /// Enqueue this request. The importer id must be registered.
    pub async fn enqueue(
        &self,
        dispatcher: &dyn QueueDispatcher,
        importers: &dyn ImporterRegistry,
    ) -> Result<TaskId> {
        if importers.importer(&self.importer_id).is_none() {
            return Err(DeliveryError::InconsistentData(format!(
                "Unknown importer `{}`",
                self.importer_id
            )));
        }
        let task = TaskDescriptor::new(IMPORT_AND_COMPILE_ACTION, self.to_params(), TASK_TITLE);
        Ok(dispatcher.create_task(task).await?)
    }
}

/// Import-and-compile pipeline with its collaborators injected.
pub struct ImportAndCompileTask {
    store: Arc<dyn ResourceStore>,
    importers: Arc<dyn ImporterRegistry>,
    compiler: Arc<dyn DeliveryCompiler>,
    cleanup: Arc<dyn ImportCleanup>,
    delivery_root: ResourceUri,
}

impl ImportAndCompileTask {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        importers: Arc<dyn ImporterRegistry>,
        compiler: Arc<dyn DeliveryCompiler>,
        cleanup: Arc<dyn ImportCleanup>,
    ) -> Self {
        Self {
            store,
            importers,
            compiler,
            cleanup,
            delivery_root: ResourceUri::new(DELIVERY_ASSEMBLY_CLASS),
        }
    }

    /// Override the root class deliveries are filed under.
    pub fn with_delivery_root(mut self, root: impl Into<ResourceUri>) -> Self {
        self.delivery_root = root.into();
        self
    }

    /// Run the pipeline. Always returns a report-bearing outcome.
    pub async fn run(&self, params: &Map<String, Value>) -> TaskOutcome {
        let mut import_report = None;
        match self.execute(params, &mut import_report).await {
            Ok(report) => TaskOutcome::Completed(report),
            Err(error) => self.fail(error, import_report).await,
        }
    }

    async fn execute(
        &self,
        params: &Map<String, Value>,
        import_report: &mut Option<Report>,
    ) -> Result<Report> {
        let request = ImportAndCompileRequest::from_params(params)?;
        let importer = self.test_importer(&request.importer_id)?;

        let imported = import_report.insert(importer.import(&request.file).await?);
        if !imported.is_success() {
            return Err(DeliveryError::ImportFailure {
                file: request.file.basename().to_string(),
                message: imported.message.clone(),
            });
        }
        let test_uri = imported.child_resources().pop().ok_or_else(|| {
            DeliveryError::ImportFailure {
                file: request.file.basename().to_string(),
                message: "import report names no test".to_string(),
            }
        })?;
        let test = self
            .store
            .get_resource(&ResourceUri::new(test_uri.as_str()))
            .await?
            .ok_or(StoreError::ResourceNotFound { uri: test_uri })?;

        let label = format!("Delivery of {}", test.label());
        let destination = ClassResolver::new(self.store.clone())
            .resolve(&self.delivery_root, &request.delivery_class_labels)
            .await?;
        let compilation = self
            .compiler
            .compile(&destination, &test, &label, None, &request.custom)
            .await?;

        if compilation.is_error() {
            obs::emit_compile_error(test.uri.as_str(), &compilation.message);
        }

        let delivery = match compilation.resource() {
            Some(uri) => self.store.get_resource(&ResourceUri::new(uri)).await?,
            None => None,
        };
        let Some(delivery) = delivery else {
            let message = compilation.message.clone();
            if let Some(report) = import_report.as_mut() {
                report.add(compilation);
            }
            return Err(DeliveryError::Compilation(format!(
                "no delivery produced for test {}: {}",
                test.uri, message
            )));
        };

        for (property, value) in &request.custom {
            self.store
                .edit_property_values(&delivery.uri, property, value.clone())
                .await?;
        }

        let mut report = import_report.take().unwrap_or_else(|| Report::success(""));
        report.add(compilation);
        report.set_data(json!({ DELIVERY_URI_DATA_KEY: delivery.uri.as_str() }));
        info!(
            test = %test.uri,
            delivery = %delivery.uri,
            class = %destination.uri,
            "delivery compiled from imported test"
        );
        Ok(report)
    }

    fn test_importer(&self, id: &str) -> Result<Arc<dyn TestImporter>> {
        match self.importers.importer(id) {
            Some(RegisteredImporter::Test(importer)) => Ok(importer),
            Some(RegisteredImporter::Other { kind }) => Err(DeliveryError::InconsistentData(
                format!("Wrong importer `{}` ({} importer)", id, kind),
            )),
            None => Err(DeliveryError::InconsistentData(format!(
                "Wrong importer `{}`",
                id
            ))),
        }
    }

    async fn fail(&self, error: DeliveryError, import_report: Option<Report>) -> TaskOutcome {
        let cleanup = match &import_report {
            None => CleanupStatus::NotNeeded,
            Some(partial) => match self.cleanup.clear_related_resources(partial).await {
                Ok(()) => CleanupStatus::Cleaned,
                Err(e) => {
                    warn!(error = %e, "cleanup of imported resources failed");
                    CleanupStatus::Failed(e)
                }
            },
        };

        let mut report = Report::failure(error.to_string());
        if let Some(partial) = &import_report {
            for node in partial.errors() {
                report.add(node.clone());
            }
        }
        if let CleanupStatus::Failed(e) = &cleanup {
            report.add(Report::failure(format!(
                "cleanup of imported resources failed: {}",
                e
            )));
        }

        obs::emit_pipeline_failed(TASK_NAME, &error, cleanup_label(&cleanup));
        TaskOutcome::Failed {
            report,
            error,
            cleanup,
        }
    }
}

fn cleanup_label(cleanup: &CleanupStatus) -> &'static str {
    match cleanup {
        CleanupStatus::NotNeeded => "not_needed",
        CleanupStatus::Cleaned => "cleaned",
        CleanupStatus::Failed(_) => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_params_roundtrip_keeps_labels_order() {
        let request = ImportAndCompileRequest::new("qtiTest", FileReference::new("up/math.zip"))
            .with_custom("maxExec", 2)
            .with_class_labels(["GroupA", "GroupB"]);
        let parsed = ImportAndCompileRequest::from_params(&request.to_params()).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn missing_file_is_reported_first() {
        let params = json!({ "importer": "qtiTest" }).as_object().cloned().unwrap();
        let err = ImportAndCompileRequest::from_params(&params).unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::MissingParameter { ref name, .. } if name == "file"
        ));
    }

    #[test]
    fn missing_importer_is_reported() {
        let params = json!({ "file": "up/math.zip" }).as_object().cloned().unwrap();
        let err = ImportAndCompileRequest::from_params(&params).unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::MissingParameter { ref name, .. } if name == "importer"
        ));
    }
}
