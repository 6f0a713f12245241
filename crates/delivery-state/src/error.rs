//! Error types for delivery-state

use thiserror::Error;

/// Errors raised by the resource store, archival filesystems and dispatcher.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Resource lookup by URI failed
    #[error("resource not found: {uri}")]
    ResourceNotFound { uri: String },

    /// Class lookup by URI failed
    #[error("class not found: {uri}")]
    ClassNotFound { uri: String },

    /// Read or update of a file that does not exist
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// Fresh write over a file that already exists
    #[error("file already exists: {path}")]
    FileExists { path: String },

    /// Path is absolute, empty, or escapes the filesystem root
    #[error("invalid path: {path}")]
    InvalidPath { path: String },

    /// No filesystem registered under the given id
    #[error("filesystem not found: {id}")]
    FileSystemNotFound { id: String },

    /// Queue dispatcher rejected a task
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
