//! In-memory collaborator fakes for tests and local runs.
//!
//! They act on a [`delivery_state::ResourceStore`] so pipelines under test
//! observe real resource creation and property edits.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use delivery_state::{ClassNode, Resource, ResourceStore, ResourceUri};
use serde_json::{json, Map, Value};

use crate::collaborators::{
    DeliveryCompiler, ExportRequest, FileReference, ImportCleanup, ImporterRegistry,
    PackageExporter, PackageProcessor, RegisteredImporter, TestImporter,
};
use crate::domain::{DeliveryError, Report, Result, RESOURCE_DATA_KEY};
use crate::ontology::{DELIVERY_ORIGIN_PROPERTY, TEST_ITEMS_PROPERTY};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Importer that creates a test (and its items) in the store.
///
/// The test label is the file name without extension.
pub struct FakeTestImporter {
    store: Arc<dyn ResourceStore>,
    test_class: ResourceUri,
    item_class: ResourceUri,
    items_per_test: usize,
    failure: Mutex<Option<String>>,
    imported: Mutex<Vec<ResourceUri>>,
}

impl FakeTestImporter {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        test_class: impl Into<ResourceUri>,
        item_class: impl Into<ResourceUri>,
    ) -> Self {
        Self {
            store,
            test_class: test_class.into(),
            item_class: item_class.into(),
            items_per_test: 0,
            failure: Mutex::new(None),
            imported: Mutex::new(Vec::new()),
        }
    }

    pub fn with_items(mut self, count: usize) -> Self {
        self.items_per_test = count;
        self
    }

    /// Make the next imports return an error report after creating items.
    pub fn fail_with(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }

    /// Every resource created so far, items before tests.
    pub fn imported(&self) -> Vec<ResourceUri> {
        lock(&self.imported).clone()
    }
}

#[async_trait]
impl TestImporter for FakeTestImporter {
    async fn import(&self, file: &FileReference) -> Result<Report> {
        let name = file.basename();
        let label = name.rsplit_once('.').map_or(name, |(stem, _)| stem).to_string();

        let mut report = Report::success(format!("{} imported", name));
        let mut items = Vec::new();
        for n in 1..=self.items_per_test {
            let item = self
                .store
                .create_resource(&self.item_class, &format!("{} item {}", label, n))
                .await?;
            lock(&self.imported).push(item.uri.clone());
            report.add(
                Report::info(format!("item {} imported", item.uri))
                    .with_data(json!({ "item": item.uri.as_str() })),
            );
            items.push(Value::String(item.uri.0));
        }

        if let Some(message) = lock(&self.failure).clone() {
            let mut failed = Report::failure(format!("{} could not be imported", name));
            failed.children = report.children;
            failed.add(Report::failure(message));
            return Ok(failed);
        }

        let test = self.store.create_resource(&self.test_class, &label).await?;
        self.store
            .edit_property_values(&test.uri, TEST_ITEMS_PROPERTY, Value::Array(items))
            .await?;
        lock(&self.imported).push(test.uri.clone());
        report.add(
            Report::success(format!("test {} imported", label))
                .with_data(json!({ RESOURCE_DATA_KEY: test.uri.as_str() })),
        );
        Ok(report)
    }
}

/// Registry over a fixed set of importers.
#[derive(Default)]
pub struct StaticImporterRegistry {
    importers: HashMap<String, RegisteredImporter>,
}

impl StaticImporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_test_importer(mut self, id: &str, importer: Arc<dyn TestImporter>) -> Self {
        self.importers
            .insert(id.to_string(), RegisteredImporter::Test(importer));
        self
    }

    pub fn with_other_importer(mut self, id: &str, kind: &str) -> Self {
        self.importers.insert(
            id.to_string(),
            RegisteredImporter::Other {
                kind: kind.to_string(),
            },
        );
        self
    }
}

impl ImporterRegistry for StaticImporterRegistry {
    fn importer(&self, id: &str) -> Option<RegisteredImporter> {
        self.importers.get(id).cloned()
    }
}

/// Cleanup that deletes every resource named in the report tree.
pub struct RecordingCleanup {
    store: Arc<dyn ResourceStore>,
    fail: Mutex<bool>,
    calls: Mutex<usize>,
}

impl RecordingCleanup {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            fail: Mutex::new(false),
            calls: Mutex::new(0),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }

    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

fn referenced_resources(report: &Report, out: &mut Vec<String>) {
    if let Some(data) = &report.data {
        for key in [RESOURCE_DATA_KEY, "item"] {
            if let Some(uri) = data.get(key).and_then(Value::as_str) {
                out.push(uri.to_string());
            }
        }
    }
    for child in &report.children {
        referenced_resources(child, out);
    }
}

#[async_trait]
impl ImportCleanup for RecordingCleanup {
    async fn clear_related_resources(&self, import_report: &Report) -> Result<()> {
        *lock(&self.calls) += 1;
        if *lock(&self.fail) {
            return Err(DeliveryError::Collaborator("cleanup backend unavailable".into()));
        }
        let mut uris = Vec::new();
        referenced_resources(import_report, &mut uris);
        for uri in uris {
            self.store.delete_resource(&ResourceUri::new(uri)).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compiler that files a delivery under the destination class and links it
/// to its origin test.
pub struct FakeCompiler {
    store: Arc<dyn ResourceStore>,
    mode: Mutex<CompileMode>,
    compiled: Mutex<Vec<ResourceUri>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompileMode {
    Deliver,
    ErrorWithDelivery,
    NoDelivery,
}

impl FakeCompiler {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            mode: Mutex::new(CompileMode::Deliver),
            compiled: Mutex::new(Vec::new()),
        }
    }

    /// Return an error report that still names a delivery.
    pub fn report_errors(&self) {
        *lock(&self.mode) = CompileMode::ErrorWithDelivery;
    }

    /// Return an error report and create nothing.
    pub fn produce_nothing(&self) {
        *lock(&self.mode) = CompileMode::NoDelivery;
    }

    pub fn compiled(&self) -> Vec<ResourceUri> {
        lock(&self.compiled).clone()
    }
}

#[async_trait]
impl DeliveryCompiler for FakeCompiler {
    async fn compile(
        &self,
        destination: &ClassNode,
        test: &Resource,
        label: &str,
        _assembly: Option<&ResourceUri>,
        _custom: &Map<String, Value>,
    ) -> Result<Report> {
        let mode = *lock(&self.mode);
        if mode == CompileMode::NoDelivery {
            return Ok(Report::failure(format!("{} could not be compiled", test.uri)));
        }

        let delivery = self.store.create_resource(&destination.uri, label).await?;
        self.store
            .edit_property_values(
                &delivery.uri,
                DELIVERY_ORIGIN_PROPERTY,
                Value::String(test.uri.0.clone()),
            )
            .await?;
        lock(&self.compiled).push(delivery.uri.clone());

        let data = json!({ RESOURCE_DATA_KEY: delivery.uri.as_str() });
        Ok(match mode {
            CompileMode::ErrorWithDelivery => {
                Report::failure(format!("{} compiled with warnings", label)).with_data(data)
            }
            _ => Report::success(format!("{} compiled", label)).with_data(data),
        })
    }
}

// ---------------------------------------------------------------------------
// Packaging
// ---------------------------------------------------------------------------

/// Exporter that writes fixed bytes as `<filename>.zip` plus any extra files.
pub struct FakePackageExporter {
    contents: Mutex<Vec<u8>>,
    extra_files: Vec<String>,
    fail: Mutex<Option<String>>,
    exported: Mutex<Vec<(ExportRequest, PathBuf)>>,
}

impl FakePackageExporter {
    pub fn new(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: Mutex::new(contents.into()),
            extra_files: Vec::new(),
            fail: Mutex::new(None),
            exported: Mutex::new(Vec::new()),
        }
    }

    /// Also write these file names (each with the same contents).
    pub fn with_extra_file(mut self, name: impl Into<String>) -> Self {
        self.extra_files.push(name.into());
        self
    }

    pub fn set_contents(&self, contents: impl Into<Vec<u8>>) {
        *lock(&self.contents) = contents.into();
    }

    pub fn fail_with(&self, message: Option<&str>) {
        *lock(&self.fail) = message.map(str::to_string);
    }

    /// Requests received and the directory each export went to.
    pub fn exports(&self) -> Vec<(ExportRequest, PathBuf)> {
        lock(&self.exported).clone()
    }
}

#[async_trait]
impl PackageExporter for FakePackageExporter {
    async fn export(&self, request: &ExportRequest, destination: &Path) -> Result<()> {
        lock(&self.exported).push((request.clone(), destination.to_path_buf()));
        if let Some(message) = lock(&self.fail).clone() {
            return Err(DeliveryError::Collaborator(message));
        }
        let contents = lock(&self.contents).clone();
        tokio::fs::write(destination.join(format!("{}.zip", request.filename)), &contents).await?;
        for name in &self.extra_files {
            tokio::fs::write(destination.join(name), &contents).await?;
        }
        Ok(())
    }
}

/// Processor that records each package it sees.
#[derive(Default)]
pub struct RecordingProcessor {
    processed: Mutex<Vec<(String, Map<String, Value>)>>,
    fail: Mutex<bool>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }

    /// `(file name, params)` per processed package.
    pub fn processed(&self) -> Vec<(String, Map<String, Value>)> {
        lock(&self.processed).clone()
    }
}

#[async_trait]
impl PackageProcessor for RecordingProcessor {
    async fn process(&self, package: &Path, params: &Map<String, Value>) -> Result<()> {
        if *lock(&self.fail) {
            return Err(DeliveryError::InconsistentData(format!(
                "package {} rejected",
                package.display()
            )));
        }
        let name = package
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        lock(&self.processed).push((name, params.clone()));
        Ok(())
    }
}
