//! Worker configuration.

use std::path::PathBuf;

pub const DEFAULT_FILE_SYSTEM_ID: &str = "dataStore";
pub const DEFAULT_SYNC_MAX_RETRIES: u32 = 3;

/// Settings for a [`crate::worker::TaskWorker`] and the `deliveryd` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Root directory of the local archival filesystems
    pub archive_root: PathBuf,
    /// Filesystem that metadata sync follow-ups archive into
    pub file_system_id: String,
    /// Tenant scope for metadata sync follow-ups
    pub tenant_id: Option<String>,
    pub sync_max_retries: u32,
}

impl WorkerConfig {
    pub fn new(archive_root: impl Into<PathBuf>) -> Self {
        Self {
            archive_root: archive_root.into(),
            file_system_id: DEFAULT_FILE_SYSTEM_ID.to_string(),
            tenant_id: None,
            sync_max_retries: DEFAULT_SYNC_MAX_RETRIES,
        }
    }

    pub fn with_file_system_id(mut self, id: impl Into<String>) -> Self {
        self.file_system_id = id.into();
        self
    }

    pub fn with_tenant_id(mut self, tenant: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant.into()).filter(|t: &String| !t.is_empty());
        self
    }

    pub fn with_sync_max_retries(mut self, retries: u32) -> Self {
        self.sync_max_retries = retries;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - DELIVERY_ARCHIVE_ROOT (required)
    /// - DELIVERY_FILESYSTEM_ID (optional, default: "dataStore")
    /// - DELIVERY_TENANT_ID (optional)
    /// - DELIVERY_SYNC_MAX_RETRIES (optional, default: 3)
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply the optional `DELIVERY_*` variables on top of `self`.
    pub fn apply_env(self) -> std::result::Result<Self, String> {
        self.apply_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> std::result::Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let archive_root = lookup("DELIVERY_ARCHIVE_ROOT")
            .filter(|v| !v.is_empty())
            .ok_or("DELIVERY_ARCHIVE_ROOT not set")?;
        Self::new(archive_root).apply_lookup(lookup)
    }

    fn apply_lookup<F>(mut self, lookup: F) -> std::result::Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("DELIVERY_FILESYSTEM_ID").filter(|v| !v.is_empty()) {
            self = self.with_file_system_id(id);
        }
        if let Some(tenant) = lookup("DELIVERY_TENANT_ID") {
            self = self.with_tenant_id(tenant);
        }
        if let Some(raw) = lookup("DELIVERY_SYNC_MAX_RETRIES") {
            let retries = raw
                .trim()
                .parse::<u32>()
                .map_err(|e| format!("DELIVERY_SYNC_MAX_RETRIES invalid ({raw}): {e}"))?;
            self = self.with_sync_max_retries(retries);
        }
        Ok(self)
    }
}
