//! Restore configuration
//!
//! Loaded from TOML, then optionally overridden from the environment:
//!
//! ```toml
//! local_root = "/var/backups"
//! page_size = 500
//!
//! [location]
//! bucket = "backups"
//! cluster_id = "c1"
//! datacenter_id = "dc1"
//! node_id = "n1"
//!
//! [retry]
//! max_attempts = 5
//! strategy = "linear"
//! ```

use crate::core::reference::StorageLocation;
use crate::core::retry::RetryConfig;
use crate::error::{RestoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_BUCKET: &str = "BLOB_RESTORE_BUCKET";
pub const ENV_CLUSTER: &str = "BLOB_RESTORE_CLUSTER";
pub const ENV_DATACENTER: &str = "BLOB_RESTORE_DATACENTER";
pub const ENV_NODE: &str = "BLOB_RESTORE_NODE";
pub const ENV_ROOT: &str = "BLOB_RESTORE_ROOT";

/// Everything a restore run needs to know up front
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Root directory for the local directory backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_root: Option<PathBuf>,

    /// Listing page size requested from the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,

    pub location: StorageLocation,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl RestoreConfig {
    pub fn new(location: StorageLocation) -> Self {
        Self {
            local_root: None,
            page_size: None,
            location,
            retry: RetryConfig::default(),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: RestoreConfig =
            toml::from_str(s).map_err(|e| RestoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RestoreError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RestoreError::Config(e.to_string()))
    }

    /// Override fields from the process environment
    pub fn apply_process_env(self) -> Result<Self> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Override fields from `lookup`, then re-validate
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bucket) = lookup(ENV_BUCKET) {
            self.location.bucket = bucket;
        }
        if let Some(cluster) = lookup(ENV_CLUSTER) {
            self.location.cluster_id = cluster;
        }
        if let Some(datacenter) = lookup(ENV_DATACENTER) {
            self.location.datacenter_id = datacenter;
        }
        if let Some(node) = lookup(ENV_NODE) {
            self.location.node_id = node;
        }
        if let Some(root) = lookup(ENV_ROOT) {
            self.local_root = Some(PathBuf::from(root));
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.location.validate()?;

        if self.retry.enabled && self.retry.max_attempts == 0 {
            return Err(RestoreError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(RestoreError::Config(format!(
                "retry.max_backoff_ms ({}) is below retry.initial_backoff_ms ({})",
                self.retry.max_backoff_ms, self.retry.initial_backoff_ms
            )));
        }

        if self.page_size == Some(0) {
            return Err(RestoreError::Config("page_size must be at least 1".to_string()));
        }

        Ok(())
    }
}
