use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StoreError;
use crate::storage_traits::{ArchiveFileSystem, FileSystemRegistry, StorageResult};

/// Archival filesystem rooted at a local directory.
///
/// Layout: `<root>/<relative path>`. Writes are atomic (temp file in the
/// target directory, then rename), so a concurrent reader never sees a
/// partially written package.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    /// Create a filesystem rooted at `root`. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let trimmed = path.trim_end_matches('/');
        let relative = Path::new(trimmed);
        let valid = !trimmed.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn write_atomic(target: PathBuf, contents: Vec<u8>) -> StorageResult<()> {
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StoreError::InvalidPath {
                path: target.display().to_string(),
            })?;
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&contents)?;
        tmp.persist(&target).map_err(|e| e.error)?;
        debug!(path = %target.display(), bytes = contents.len(), "archive file written");
        Ok(())
    }
}

/// Relative `/`-joined paths of every file below `dir`.
fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect();
            out.push(parts.join("/"));
        }
    }
    Ok(())
}

#[async_trait]
impl ArchiveFileSystem for LocalFileSystem {
    async fn has(&self, path: &str) -> StorageResult<bool> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&target).await?)
    }

    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let target = self.resolve(path)?;
        tokio::fs::read(&target).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StoreError::FileNotFound {
                    path: path.to_string(),
                }
            } else {
                StoreError::Io(e)
            }
        })
    }

    async fn write(&self, path: &str, contents: &[u8]) -> StorageResult<()> {
        let target = self.resolve(path)?;
        if tokio::fs::try_exists(&target).await? {
            return Err(StoreError::FileExists {
                path: path.to_string(),
            });
        }
        let contents = contents.to_vec();
        tokio::task::spawn_blocking(move || Self::write_atomic(target, contents))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::new(ErrorKind::Other, e)))?
    }

    async fn update(&self, path: &str, contents: &[u8]) -> StorageResult<()> {
        let target = self.resolve(path)?;
        if !tokio::fs::try_exists(&target).await? {
            return Err(StoreError::FileNotFound {
                path: path.to_string(),
            });
        }
        let contents = contents.to_vec();
        tokio::task::spawn_blocking(move || Self::write_atomic(target, contents))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::new(ErrorKind::Other, e)))?
    }

    async fn delete_dir(&self, path: &str) -> StorageResult<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_dir_all(&target).await {
            Ok(()) => {
                debug!(path = %target.display(), "archive directory removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let root = self.root.clone();
        let walked = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            match collect_files(&root, &root, &mut files) {
                Ok(()) => Ok(files),
                // root is created lazily by the first write
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::new(ErrorKind::Other, e)))?;
        let mut files = walked?;
        files.retain(|f| f.starts_with(prefix));
        files.sort();
        Ok(files)
    }
}

/// Maps filesystem ids to sub-directories of a shared archive root.
///
/// Layout: `<root>/<filesystem id>/...`
#[derive(Debug, Clone)]
pub struct LocalFileSystemRegistry {
    root: PathBuf,
}

impl LocalFileSystemRegistry {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl FileSystemRegistry for LocalFileSystemRegistry {
    fn file_system(&self, id: &str) -> StorageResult<Arc<dyn ArchiveFileSystem>> {
        let valid = !id.is_empty()
            && Path::new(id)
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            && !id.contains('/');
        if !valid {
            return Err(StoreError::FileSystemNotFound { id: id.to_string() });
        }
        Ok(Arc::new(LocalFileSystem {
            root: self.root.join(id),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_fs() -> (tempfile::TempDir, LocalFileSystem) {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path()).unwrap();
        (dir, fs)
    }

    #[tokio::test]
    async fn write_then_read() {
        let (_dir, fs) = make_fs();
        fs.write("a-t1/QTIPackage.zip", b"zip bytes").await.unwrap();
        assert_eq!(fs.read("a-t1/QTIPackage.zip").await.unwrap(), b"zip bytes");
        assert!(fs.has("a-t1/").await.unwrap());
        assert!(fs.has("a-t1/QTIPackage.zip").await.unwrap());
    }

    #[tokio::test]
    async fn write_refuses_existing_file() {
        let (_dir, fs) = make_fs();
        fs.write("x/p.zip", b"one").await.unwrap();
        let err = fs.write("x/p.zip", b"two").await.unwrap_err();
        assert!(matches!(err, StoreError::FileExists { .. }));
        assert_eq!(fs.read("x/p.zip").await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn update_overwrites_in_place() {
        let (dir, fs) = make_fs();
        fs.write("x/p.zip", b"one").await.unwrap();
        fs.update("x/p.zip", b"two").await.unwrap();
        assert_eq!(fs.read("x/p.zip").await.unwrap(), b"two");

        // No leftover temp files next to the archive.
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("x")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn update_requires_existing_file() {
        let (_dir, fs) = make_fs();
        let err = fs.update("x/p.zip", b"two").await.unwrap_err();
        assert!(matches!(err, StoreError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn delete_dir_is_recursive_and_idempotent() {
        let (_dir, fs) = make_fs();
        fs.write("d-t/QTIPackage.zip", b"z").await.unwrap();
        fs.write("d-t/nested/meta.json", b"{}").await.unwrap();
        fs.delete_dir("d-t/").await.unwrap();
        assert!(!fs.has("d-t/").await.unwrap());
        fs.delete_dir("d-t/").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_escaping_paths() {
        let (_dir, fs) = make_fs();
        for bad in ["../outside.zip", "/etc/passwd", "", "a/../../b"] {
            let err = fs.write(bad, b"x").await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidPath { .. }), "{bad}");
        }
    }

    #[tokio::test]
    async fn list_returns_sorted_relative_paths() {
        let (_dir, fs) = make_fs();
        fs.write("b-/QTIPackage.zip", b"2").await.unwrap();
        fs.write("a-/QTIPackage.zip", b"1").await.unwrap();
        assert_eq!(
            fs.list("").await.unwrap(),
            vec!["a-/QTIPackage.zip".to_string(), "b-/QTIPackage.zip".to_string()]
        );
        assert_eq!(fs.list("b-").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn registry_creates_roots_on_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LocalFileSystemRegistry::new(dir.path());
        let fs = registry.file_system("dataStore").unwrap();
        assert!(fs.list("").await.unwrap().is_empty());
        assert!(!fs.has("d-/QTIPackage.zip").await.unwrap());
        fs.delete_dir("d-").await.unwrap();

        fs.write("d-/QTIPackage.zip", b"z").await.unwrap();
        assert!(dir.path().join("dataStore/d-/QTIPackage.zip").is_file());
        assert_eq!(fs.list("").await.unwrap(), vec!["d-/QTIPackage.zip".to_string()]);
    }

    #[test]
    fn registry_scopes_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LocalFileSystemRegistry::new(dir.path());
        assert!(registry.file_system("dataStore").is_ok());
        assert!(!dir.path().join("dataStore").exists());
        assert!(matches!(
            registry.file_system("../escape"),
            Err(StoreError::FileSystemNotFound { .. })
        ));
        assert!(registry.file_system("").is_err());
    }
}
