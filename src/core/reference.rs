//! Reference resolution: local-style object keys to remote object keys
//!
//! Two mappings exist:
//! - **bare**: the key is used as-is, for globally rooted artifacts
//! - **node-aware**: the key is prefixed with `cluster/datacenter/node`

use crate::core::validation::{validate_bucket_name, validate_segment};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Where one node's backups live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub bucket: String,
    pub cluster_id: String,
    pub datacenter_id: String,
    pub node_id: String,
}

impl StorageLocation {
    /// Create a validated storage location
    pub fn new(
        bucket: impl Into<String>,
        cluster_id: impl Into<String>,
        datacenter_id: impl Into<String>,
        node_id: impl Into<String>,
    ) -> Result<Self> {
        let location = Self {
            bucket: bucket.into(),
            cluster_id: cluster_id.into(),
            datacenter_id: datacenter_id.into(),
            node_id: node_id.into(),
        };
        location.validate()?;
        Ok(location)
    }

    /// Check the bucket name and every prefix segment
    pub fn validate(&self) -> Result<()> {
        validate_bucket_name(&self.bucket)?;
        validate_segment("cluster id", &self.cluster_id)?;
        validate_segment("datacenter id", &self.datacenter_id)?;
        validate_segment("node id", &self.node_id)?;
        Ok(())
    }

    /// `cluster/datacenter/node`
    pub fn node_aware_prefix(&self) -> String {
        format!("{}/{}/{}", self.cluster_id, self.datacenter_id, self.node_id)
    }

    /// Remote key of `object_key` inside this node's namespace
    pub fn resolve_node_aware_remote_path(&self, object_key: impl AsRef<Path>) -> String {
        let key = path_to_key(object_key.as_ref());
        if key.is_empty() {
            self.node_aware_prefix()
        } else {
            format!("{}/{}", self.node_aware_prefix(), key)
        }
    }

    /// Reference whose canonical path is scoped to this node
    pub fn resolve_node_aware_reference(&self, object_key: impl AsRef<Path>) -> RemoteObjectReference {
        let object_key = object_key.as_ref();
        RemoteObjectReference {
            canonical_path: self.resolve_node_aware_remote_path(object_key),
            object_key: object_key.to_path_buf(),
        }
    }

    /// Strip the node-aware prefix from a remote key.
    ///
    /// Returns `None` when the key lies outside this node's namespace.
    pub fn relativize<'a>(&self, remote_key: &'a str) -> Option<&'a str> {
        let prefix = self.node_aware_prefix();
        remote_key
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
    }
}

/// A local-relative object key paired with its fully resolved remote key
///
/// Only the resolver functions construct references, so `canonical_path`
/// is always `object_key` plus zero or more prefix segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteObjectReference {
    object_key: PathBuf,
    canonical_path: String,
}

impl RemoteObjectReference {
    /// The local-relative path identifying the artifact
    pub fn object_key(&self) -> &Path {
        &self.object_key
    }

    /// The remote key
    pub fn canonical_path(&self) -> &str {
        &self.canonical_path
    }
}

impl fmt::Display for RemoteObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_path)
    }
}

/// Identity mapping for globally rooted remote paths
pub fn resolve_bare_reference(object_key: impl AsRef<Path>) -> RemoteObjectReference {
    let object_key = object_key.as_ref();
    RemoteObjectReference {
        canonical_path: path_to_key(object_key),
        object_key: object_key.to_path_buf(),
    }
}

/// Render a relative path as a `/`-separated object key.
///
/// Root, prefix and `.` components are dropped so the result is the same on
/// every platform.
pub fn path_to_key(path: &Path) -> String {
    let mut segments: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => segments.push("..".to_string()),
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
        }
    }
    segments.join("/")
}

/// Last `/`-separated segment of a remote key
pub fn last_segment(remote_key: &str) -> &str {
    remote_key.rsplit('/').next().unwrap_or(remote_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> StorageLocation {
        StorageLocation::new("backups", "c1", "dc1", "n1").unwrap()
    }

    #[test]
    fn test_bare_reference_is_identity() {
        let reference = resolve_bare_reference("manifests/snap1");
        assert_eq!(reference.canonical_path(), "manifests/snap1");
        assert_eq!(reference.object_key(), Path::new("manifests/snap1"));
    }

    #[test]
    fn test_node_aware_reference() {
        let reference = location().resolve_node_aware_reference("manifests/snap1");
        assert_eq!(reference.canonical_path(), "c1/dc1/n1/manifests/snap1");
        assert_eq!(reference.object_key(), Path::new("manifests/snap1"));
    }

    #[test]
    fn test_node_aware_remote_path_of_empty_key() {
        assert_eq!(location().resolve_node_aware_remote_path(""), "c1/dc1/n1");
    }

    #[test]
    fn test_path_to_key_normalizes() {
        assert_eq!(path_to_key(Path::new("/data/./ks/table")), "data/ks/table");
        assert_eq!(path_to_key(Path::new("data/ks/")), "data/ks");
    }

    #[test]
    fn test_relativize() {
        let loc = location();
        assert_eq!(loc.relativize("c1/dc1/n1/data/ks/a.db"), Some("data/ks/a.db"));
        assert_eq!(loc.relativize("c1/dc1/n2/data/ks/a.db"), None);
        assert_eq!(loc.relativize("c1/dc1/n1"), None);
        assert_eq!(loc.relativize("c1/dc1/n10/a.db"), None);
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("c1/dc1/n1/manifests/m-1.json"), "m-1.json");
        assert_eq!(last_segment("plain"), "plain");
    }

    #[test]
    fn test_invalid_location() {
        assert!(StorageLocation::new("backups", "", "dc1", "n1").is_err());
        assert!(StorageLocation::new("Backups", "c1", "dc1", "n1").is_err());
    }
}
