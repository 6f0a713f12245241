//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryResourceStore`, `MemoryFileSystem`,
//! `MemoryFileSystemRegistry` and `MemoryQueueDispatcher` that satisfy the
//! trait contracts without any external dependencies.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::schema::*;
use crate::storage_traits::*;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn injected_failure(what: &str) -> StoreError {
    StoreError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("injected failure: {}", what),
    ))
}

// ---------------------------------------------------------------------------
// MemoryResourceStore
// ---------------------------------------------------------------------------

const DEFAULT_NAMESPACE: &str = "http://delivery.local/ontology.rdf";

#[derive(Debug, Default)]
struct Graph {
    classes: HashMap<ResourceUri, ClassNode>,
    children: HashMap<ResourceUri, Vec<ResourceUri>>,
    resources: BTreeMap<ResourceUri, Resource>,
    rejected_properties: HashSet<String>,
}

impl Graph {
    fn class_closure(&self, root: &ResourceUri, recursive: bool) -> HashSet<ResourceUri> {
        let mut seen = HashSet::from([root.clone()]);
        if !recursive {
            return seen;
        }
        let mut queue = VecDeque::from([root.clone()]);
        while let Some(current) = queue.pop_front() {
            for child in self.children.get(&current).into_iter().flatten() {
                if seen.insert(child.clone()) {
                    queue.push_back(child.clone());
                }
            }
        }
        seen
    }
}

/// In-memory graph store backed by hash maps of classes and resources.
#[derive(Debug)]
pub struct MemoryResourceStore {
    namespace: String,
    graph: Mutex<Graph>,
}

impl Default for MemoryResourceStore {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            graph: Mutex::new(Graph::default()),
        }
    }
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root class (no parent).
    pub fn with_root_class(self, uri: impl Into<ResourceUri>, label: &str) -> Self {
        let uri = uri.into();
        {
            let mut graph = lock(&self.graph);
            graph.classes.insert(
                uri.clone(),
                ClassNode {
                    uri: uri.clone(),
                    label: label.to_string(),
                    parent: None,
                },
            );
        }
        self
    }

    /// Make every edit of `property` fail with an I/O error.
    pub fn with_rejected_property(self, property: &str) -> Self {
        lock(&self.graph)
            .rejected_properties
            .insert(property.to_string());
        self
    }

    pub fn class_count(&self) -> usize {
        lock(&self.graph).classes.len()
    }

    pub fn resource_count(&self) -> usize {
        lock(&self.graph).resources.len()
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn get_class(&self, uri: &ResourceUri) -> StorageResult<ClassNode> {
        lock(&self.graph)
            .classes
            .get(uri)
            .cloned()
            .ok_or_else(|| StoreError::ClassNotFound {
                uri: uri.to_string(),
            })
    }

    async fn sub_classes(&self, parent: &ResourceUri) -> StorageResult<Vec<ClassNode>> {
        let graph = lock(&self.graph);
        if !graph.classes.contains_key(parent) {
            return Err(StoreError::ClassNotFound {
                uri: parent.to_string(),
            });
        }
        Ok(graph
            .children
            .get(parent)
            .into_iter()
            .flatten()
            .filter_map(|uri| graph.classes.get(uri).cloned())
            .collect())
    }

    async fn create_sub_class(
        &self,
        parent: &ResourceUri,
        label: &str,
    ) -> StorageResult<ClassNode> {
        let mut graph = lock(&self.graph);
        if !graph.classes.contains_key(parent) {
            return Err(StoreError::ClassNotFound {
                uri: parent.to_string(),
            });
        }
        let existing = graph
            .children
            .get(parent)
            .into_iter()
            .flatten()
            .filter_map(|uri| graph.classes.get(uri))
            .find(|c| c.label == label)
            .cloned();
        if let Some(class) = existing {
            return Ok(class);
        }

        let node = ClassNode {
            uri: ResourceUri::generate(&self.namespace),
            label: label.to_string(),
            parent: Some(parent.clone()),
        };
        graph.classes.insert(node.uri.clone(), node.clone());
        graph
            .children
            .entry(parent.clone())
            .or_default()
            .push(node.uri.clone());
        Ok(node)
    }

    async fn create_resource(&self, class: &ResourceUri, label: &str) -> StorageResult<Resource> {
        let mut graph = lock(&self.graph);
        if !graph.classes.contains_key(class) {
            return Err(StoreError::ClassNotFound {
                uri: class.to_string(),
            });
        }
        let resource = Resource {
            uri: ResourceUri::generate(&self.namespace),
            class: class.clone(),
            properties: BTreeMap::from([(
                LABEL_PROPERTY.to_string(),
                Value::String(label.to_string()),
            )]),
        };
        graph
            .resources
            .insert(resource.uri.clone(), resource.clone());
        Ok(resource)
    }

    async fn get_resource(&self, uri: &ResourceUri) -> StorageResult<Option<Resource>> {
        Ok(lock(&self.graph).resources.get(uri).cloned())
    }

    async fn edit_property_values(
        &self,
        resource: &ResourceUri,
        property: &str,
        value: Value,
    ) -> StorageResult<()> {
        let mut graph = lock(&self.graph);
        if graph.rejected_properties.contains(property) {
            return Err(injected_failure(property));
        }
        let target =
            graph
                .resources
                .get_mut(resource)
                .ok_or_else(|| StoreError::ResourceNotFound {
                    uri: resource.to_string(),
                })?;
        target.properties.insert(property.to_string(), value);
        Ok(())
    }

    async fn search_instances(
        &self,
        class: &ResourceUri,
        query: &PropertyQuery,
        recursive: bool,
    ) -> StorageResult<Vec<Resource>> {
        let graph = lock(&self.graph);
        if !graph.classes.contains_key(class) {
            return Err(StoreError::ClassNotFound {
                uri: class.to_string(),
            });
        }
        let classes = graph.class_closure(class, recursive);
        Ok(graph
            .resources
            .values()
            .filter(|r| classes.contains(&r.class) && query.matches(r))
            .cloned()
            .collect())
    }

    async fn delete_resource(&self, uri: &ResourceUri) -> StorageResult<()> {
        lock(&self.graph).resources.remove(uri);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryFileSystem
// ---------------------------------------------------------------------------

/// In-memory archival filesystem backed by a `BTreeMap<path, bytes>`.
///
/// Directories are implicit: a directory exists while any file lies below it.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_writes: Mutex<bool>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle injected failures for `write` and `update`.
    pub fn set_fail_writes(&self, fail: bool) {
        *lock(&self.fail_writes) = fail;
    }

    /// Snapshot of every stored path.
    pub fn paths(&self) -> Vec<String> {
        lock(&self.files).keys().cloned().collect()
    }

    fn dir_prefix(path: &str) -> String {
        format!("{}/", path.trim_end_matches('/'))
    }

    fn check_writable(&self, path: &str) -> StorageResult<()> {
        if *lock(&self.fail_writes) {
            return Err(injected_failure(path));
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveFileSystem for MemoryFileSystem {
    async fn has(&self, path: &str) -> StorageResult<bool> {
        let files = lock(&self.files);
        let prefix = Self::dir_prefix(path);
        Ok(files.contains_key(path) || files.keys().any(|k| k.starts_with(&prefix)))
    }

    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        lock(&self.files)
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::FileNotFound {
                path: path.to_string(),
            })
    }

    async fn write(&self, path: &str, contents: &[u8]) -> StorageResult<()> {
        self.check_writable(path)?;
        let mut files = lock(&self.files);
        if files.contains_key(path) {
            return Err(StoreError::FileExists {
                path: path.to_string(),
            });
        }
        files.insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn update(&self, path: &str, contents: &[u8]) -> StorageResult<()> {
        self.check_writable(path)?;
        let mut files = lock(&self.files);
        let slot = files.get_mut(path).ok_or_else(|| StoreError::FileNotFound {
            path: path.to_string(),
        })?;
        *slot = contents.to_vec();
        Ok(())
    }

    async fn delete_dir(&self, path: &str) -> StorageResult<()> {
        let prefix = Self::dir_prefix(path);
        lock(&self.files).retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(lock(&self.files)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Registry of in-memory filesystems keyed by id.
#[derive(Debug, Default)]
pub struct MemoryFileSystemRegistry {
    file_systems: Mutex<HashMap<String, Arc<MemoryFileSystem>>>,
}

impl MemoryFileSystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or fetch) the filesystem named `id`.
    pub fn register(&self, id: &str) -> Arc<MemoryFileSystem> {
        lock(&self.file_systems)
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(MemoryFileSystem::new()))
            .clone()
    }
}

impl FileSystemRegistry for MemoryFileSystemRegistry {
    fn file_system(&self, id: &str) -> StorageResult<Arc<dyn ArchiveFileSystem>> {
        lock(&self.file_systems)
            .get(id)
            .map(|fs| fs.clone() as Arc<dyn ArchiveFileSystem>)
            .ok_or_else(|| StoreError::FileSystemNotFound { id: id.to_string() })
    }
}

// ---------------------------------------------------------------------------
// MemoryQueueDispatcher
// ---------------------------------------------------------------------------

pub use crate::queue::MemoryQueueDispatcher;
