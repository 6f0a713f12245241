//! Disk-backed package exporter and the pass-through processor.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::archive::PACKAGE_EXTENSION;
use crate::collaborators::{ExportRequest, PackageExporter, PackageProcessor};
use crate::domain::{DeliveryError, Result};

/// Exports tests from a directory of prebuilt packages.
///
/// A test's package is `<packages_dir>/<urlencode(testUri)>.zip`; when the
/// test uri is itself a relative path to a zip below `packages_dir` it is
/// used as is.
#[derive(Debug, Clone)]
pub struct DirectoryPackageExporter {
    packages_dir: PathBuf,
}

impl DirectoryPackageExporter {
    pub fn new(packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            packages_dir: packages_dir.into(),
        }
    }

    fn source_for(&self, test_uri: &str) -> PathBuf {
        let relative = Path::new(test_uri);
        let is_contained_zip = relative
            .extension()
            .is_some_and(|ext| ext == PACKAGE_EXTENSION)
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if is_contained_zip {
            let direct = self.packages_dir.join(relative);
            if direct.is_file() {
                return direct;
            }
        }
        self.packages_dir.join(format!(
            "{}.{}",
            urlencoding::encode(test_uri),
            PACKAGE_EXTENSION
        ))
    }
}

#[async_trait]
impl PackageExporter for DirectoryPackageExporter {
    async fn export(&self, request: &ExportRequest, destination: &Path) -> Result<()> {
        let source = self.source_for(&request.test_uri);
        if !tokio::fs::try_exists(&source).await? {
            return Err(DeliveryError::Collaborator(format!(
                "no package for test {} at {}",
                request.test_uri,
                source.display()
            )));
        }
        let target = destination.join(format!("{}.{}", request.filename, PACKAGE_EXTENSION));
        let bytes = tokio::fs::copy(&source, &target).await?;
        debug!(source = %source.display(), target = %target.display(), bytes, "package exported");
        Ok(())
    }
}

/// Leaves packages untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProcessor;

#[async_trait]
impl PackageProcessor for NoopProcessor {
    async fn process(&self, _package: &Path, _params: &Map<String, Value>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn exports_by_encoded_uri() {
        let packages = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let name = format!("{}.zip", urlencoding::encode("http://x#t1"));
        std::fs::write(packages.path().join(name), b"zip-bytes").unwrap();

        let exporter = DirectoryPackageExporter::new(packages.path());
        let request = ExportRequest {
            filename: "QTIPackage".into(),
            test_uri: "http://x#t1".into(),
        };
        exporter.export(&request, out.path()).await.unwrap();
        assert_eq!(
            std::fs::read(out.path().join("QTIPackage.zip")).unwrap(),
            b"zip-bytes"
        );
    }

    #[tokio::test]
    async fn exports_relative_zip_path() {
        let packages = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::create_dir(packages.path().join("math")).unwrap();
        std::fs::write(packages.path().join("math/test.zip"), b"math").unwrap();

        let exporter = DirectoryPackageExporter::new(packages.path());
        let request = ExportRequest {
            filename: "QTIPackage".into(),
            test_uri: "math/test.zip".into(),
        };
        exporter.export(&request, out.path()).await.unwrap();
        assert!(out.path().join("QTIPackage.zip").is_file());
    }

    #[tokio::test]
    async fn zip_paths_outside_packages_dir_are_not_read() {
        let root = TempDir::new().unwrap();
        let packages = root.path().join("packages");
        let out = TempDir::new().unwrap();
        std::fs::create_dir(&packages).unwrap();
        std::fs::write(root.path().join("secret.zip"), b"outside").unwrap();

        let exporter = DirectoryPackageExporter::new(&packages);
        for test_uri in ["../secret.zip", "math/../../secret.zip"] {
            let request = ExportRequest {
                filename: "QTIPackage".into(),
                test_uri: test_uri.into(),
            };
            let err = exporter.export(&request, out.path()).await.unwrap_err();
            assert!(matches!(err, DeliveryError::Collaborator(_)), "{test_uri}");
        }
        let absolute = root.path().join("secret.zip").display().to_string();
        let request = ExportRequest {
            filename: "QTIPackage".into(),
            test_uri: absolute,
        };
        assert!(exporter.export(&request, out.path()).await.is_err());
        assert!(!out.path().join("QTIPackage.zip").exists());
    }

    #[tokio::test]
    async fn missing_package_is_collaborator_error() {
        let packages = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let exporter = DirectoryPackageExporter::new(packages.path());
        let request = ExportRequest {
            filename: "QTIPackage".into(),
            test_uri: "http://x#missing".into(),
        };
        let err = exporter.export(&request, out.path()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Collaborator(_)));
        assert!(err.is_retryable());
    }
}
