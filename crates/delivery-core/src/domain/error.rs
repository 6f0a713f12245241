//! Domain-level error taxonomy for Delivery Sync.

use delivery_state::StoreError;

/// Delivery pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("missing parameter `{name}` in {task}")]
    MissingParameter { name: String, task: String },

    #[error("inconsistent data: {0}")]
    InconsistentData(String),

    #[error("{file} unable to import test with message {message}")]
    ImportFailure { file: String, message: String },

    #[error("compilation failed: {0}")]
    Compilation(String),

    #[error("event {event} does not carry a delivery uri")]
    EventTypeMismatch { event: String },

    #[error("archive io failure at {path}: {source}")]
    ArchiveIo {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeliveryError {
    pub fn missing(name: &str, task: &str) -> Self {
        DeliveryError::MissingParameter {
            name: name.to_string(),
            task: task.to_string(),
        }
    }

    /// Whether re-running the same task may succeed.
    ///
    /// Technical failures (storage, I/O, collaborators) are retryable;
    /// business failures caused by the task input are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::MissingParameter { .. }
            | DeliveryError::InconsistentData(_)
            | DeliveryError::ImportFailure { .. }
            | DeliveryError::Compilation(_)
            | DeliveryError::EventTypeMismatch { .. }
            | DeliveryError::Serialization(_) => false,
            DeliveryError::Store(StoreError::InvalidPath { .. })
            | DeliveryError::Store(StoreError::FileSystemNotFound { .. }) => false,
            DeliveryError::ArchiveIo { .. }
            | DeliveryError::Store(_)
            | DeliveryError::Collaborator(_)
            | DeliveryError::Io(_) => true,
        }
    }
}

/// Result type for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;
