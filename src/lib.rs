//! # blob-restore - Restore-Side Retrieval for Node-Scoped Backups
//!
//! `blob-restore` fetches backup artifacts (data files, manifests, commit logs)
//! of a clustered data store back out of object storage. It provides:
//!
//! - **Reference resolution** - local-relative keys to bare or node-aware remote keys
//! - **Paginated listing** - lazy page walking with directory exclusion and key filters
//! - **Manifest selection** - the latest manifest by embedded timestamp
//! - **Retry-classified downloads** - transient failures retried, no partial files left behind
//! - **Text reads** - manifests and small metadata files as strings
//!
//! Talking to the storage service itself is the job of an
//! [`ObjectStorageClient`] implementation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use blob_restore::{InMemoryObjectStore, KeyFilter, Restorer, Result, StorageLocation};
//!
//! # fn main() -> Result<()> {
//! let store = InMemoryObjectStore::new();
//! let location = StorageLocation::new("backups", "c1", "dc1", "n1")?;
//! let restorer = Restorer::new(store, location);
//!
//! // Latest manifest under c1/dc1/n1/manifests
//! let manifest = restorer.download_manifest_to_string("manifests", &KeyFilter::suffix(".json"))?;
//!
//! // A node-scoped data file, downloaded with retries
//! let reference = restorer.object_key_to_node_aware_remote_reference("data/ks/table/nb-1-big-Data.db");
//! restorer.download_file("/var/lib/restore/nb-1-big-Data.db".as_ref(), &reference)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Local Directory Backend
//!
//! ```rust,no_run
//! use blob_restore::{LocalDirectoryStore, Restorer, Result, StorageLocation};
//!
//! # fn main() -> Result<()> {
//! let store = LocalDirectoryStore::new("/mnt/backups");
//! let location = StorageLocation::new("backups", "c1", "dc1", "n1")?;
//! let restorer = Restorer::new(store, location);
//!
//! let schema = restorer.download_node_file_to_string("schema", &|key: &str| key.ends_with(".cql"))?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;

pub use crate::core::{
    client::{
        ListingPage, NoProgress, ObjectStorageClient, ObjectSummary, ProgressEvent,
        ProgressListener, StorageError, StorageResult,
    },
    config::RestoreConfig,
    download::DownloadProgressListener,
    filter::{KeyFilter, KeyPredicate},
    listing::{for_each_matching, list_matching, Matches, Pages},
    local::LocalDirectoryStore,
    manifest::{select_latest_key, ManifestTimestamp},
    memory::{Fault, InMemoryObjectStore},
    reference::{resolve_bare_reference, RemoteObjectReference, StorageLocation},
    retry::{BackoffStrategy, NoRetry, Retrier, RetryConfig, RetryPolicy},
};
pub use crate::error::{ErrorKind, RestoreError, Result};

use crate::core::reference::{last_segment, path_to_key};
use crate::core::{download, listing, manifest, reader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Retrieval operations bound to one node's storage location
///
/// Every call re-queries the remote side; nothing is cached between calls,
/// and a `Restorer` holds no mutable state, so it can be shared across
/// threads restoring different files.
///
/// # Examples
///
/// ```rust,no_run
/// use blob_restore::{InMemoryObjectStore, KeyFilter, Restorer, RetryConfig, Retrier, StorageLocation};
///
/// # fn main() -> blob_restore::Result<()> {
/// let location = StorageLocation::new("backups", "c1", "dc1", "n1")?;
/// let retrier = Retrier::new(RetryConfig::new().with_max_attempts(5));
/// let restorer = Restorer::with_retry_policy(InMemoryObjectStore::new(), location, retrier);
///
/// let tokens = restorer.download_node_file_to_dir(
///     "/var/lib/restore".as_ref(),
///     "tokens",
///     &KeyFilter::contains("tokens"),
/// )?;
/// # Ok(())
/// # }
/// ```
pub struct Restorer<C, R = Retrier> {
    client: C,
    location: StorageLocation,
    retry: R,
}

impl<C: ObjectStorageClient> Restorer<C, Retrier> {
    /// Restorer with the default retry configuration
    pub fn new(client: C, location: StorageLocation) -> Self {
        Self::with_retry_policy(client, location, Retrier::default())
    }

    /// Restorer using the location and retry settings of `config`
    pub fn from_config(client: C, config: &RestoreConfig) -> Self {
        Self::with_retry_policy(
            client,
            config.location.clone(),
            Retrier::new(config.retry.clone()),
        )
    }
}

impl<C: ObjectStorageClient, R: RetryPolicy> Restorer<C, R> {
    pub fn with_retry_policy(client: C, location: StorageLocation, retry: R) -> Self {
        Self {
            client,
            location,
            retry,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    pub fn retry_policy(&self) -> &R {
        &self.retry
    }

    fn bucket(&self) -> &str {
        &self.location.bucket
    }

    /// Reference whose remote key is `object_key` as-is
    pub fn object_key_to_remote_reference(&self, object_key: impl AsRef<Path>) -> RemoteObjectReference {
        resolve_bare_reference(object_key)
    }

    /// Reference whose remote key is `cluster/datacenter/node/object_key`
    pub fn object_key_to_node_aware_remote_reference(
        &self,
        object_key: impl AsRef<Path>,
    ) -> RemoteObjectReference {
        self.location.resolve_node_aware_reference(object_key)
    }

    /// Every object under the node-aware `remote_prefix` accepted by `filter`
    pub fn list<P>(&self, remote_prefix: impl AsRef<Path>, filter: &P) -> Result<Vec<ObjectSummary>>
    where
        P: KeyPredicate + ?Sized,
    {
        let prefix = self.location.resolve_node_aware_remote_path(remote_prefix);
        listing::list_matching(&self.client, self.bucket(), &prefix, filter)
    }

    /// Streaming form of [`list`](Self::list)
    pub fn for_each_object<P, F>(&self, remote_prefix: impl AsRef<Path>, filter: &P, consumer: F) -> Result<()>
    where
        P: KeyPredicate + ?Sized,
        F: FnMut(ObjectSummary),
    {
        let prefix = self.location.resolve_node_aware_remote_path(remote_prefix);
        listing::for_each_matching(&self.client, self.bucket(), &prefix, filter, consumer)
    }

    /// Node-aware reference to the latest manifest under `remote_prefix`
    ///
    /// The reference's object key is `remote_prefix/<manifest file name>`.
    pub fn select_manifest<P>(&self, remote_prefix: impl AsRef<Path>, filter: &P) -> Result<RemoteObjectReference>
    where
        P: KeyPredicate + ?Sized,
    {
        let remote_prefix = remote_prefix.as_ref();
        let prefix = self.location.resolve_node_aware_remote_path(remote_prefix);
        let latest = manifest::find_latest_manifest(&self.client, self.bucket(), &prefix, filter)?;

        match ManifestTimestamp::parse(&latest.key).and_then(|t| t.to_datetime()) {
            Some(taken) => info!("Selected manifest {} taken at {}", latest.key, taken.to_rfc3339()),
            None => info!("Selected manifest {}", latest.key),
        }

        Ok(self.rebase(remote_prefix, &latest.key))
    }

    /// Node-aware reference to the only object under `remote_prefix`
    pub fn select_unique_object<P>(
        &self,
        remote_prefix: impl AsRef<Path>,
        filter: &P,
    ) -> Result<RemoteObjectReference>
    where
        P: KeyPredicate + ?Sized,
    {
        let remote_prefix = remote_prefix.as_ref();
        let prefix = self.location.resolve_node_aware_remote_path(remote_prefix);
        let found = manifest::find_unique_object(&self.client, self.bucket(), &prefix, filter)?;
        Ok(self.rebase(remote_prefix, &found.key))
    }

    /// Re-resolve the last segment of `remote_key` under the local prefix
    fn rebase(&self, remote_prefix: &Path, remote_key: &str) -> RemoteObjectReference {
        self.location
            .resolve_node_aware_reference(remote_prefix.join(last_segment(remote_key)))
    }

    /// Download `reference` to `local_path` under the retry policy
    ///
    /// Leaves no file at `local_path` when it fails.
    pub fn download_file(&self, local_path: &Path, reference: &RemoteObjectReference) -> Result<()> {
        download::download_file(&self.client, &self.retry, self.bucket(), local_path, reference)
    }

    /// [`download_file`](Self::download_file) reporting transfer events to `observer`
    pub fn download_file_with_progress(
        &self,
        local_path: &Path,
        reference: &RemoteObjectReference,
        observer: &dyn ProgressListener,
    ) -> Result<()> {
        download::download_file_with_progress(
            &self.client,
            &self.retry,
            self.bucket(),
            local_path,
            reference,
            observer,
        )
    }

    /// Object content as text; not retried
    pub fn download_file_to_string(&self, reference: &RemoteObjectReference) -> Result<String> {
        reader::read_as_string(&self.client, self.bucket(), reference)
    }

    /// Text of the only object under the globally rooted `remote_prefix`
    pub fn download_file_to_string_matching<P>(&self, remote_prefix: impl AsRef<Path>, filter: &P) -> Result<String>
    where
        P: KeyPredicate + ?Sized,
    {
        let prefix = path_to_key(remote_prefix.as_ref());
        let found = manifest::find_unique_object(&self.client, self.bucket(), &prefix, filter)?;
        self.download_file_to_string(&resolve_bare_reference(&found.key))
    }

    /// Text of the latest manifest under the node-aware `remote_prefix`
    pub fn download_manifest_to_string<P>(&self, remote_prefix: impl AsRef<Path>, filter: &P) -> Result<String>
    where
        P: KeyPredicate + ?Sized,
    {
        let reference = self.select_manifest(remote_prefix, filter)?;
        self.download_file_to_string(&reference)
    }

    /// Text of the only object under the node-aware `remote_prefix`
    pub fn download_node_file_to_string<P>(&self, remote_prefix: impl AsRef<Path>, filter: &P) -> Result<String>
    where
        P: KeyPredicate + ?Sized,
    {
        let reference = self.select_unique_object(remote_prefix, filter)?;
        self.download_file_to_string(&reference)
    }

    /// Download the only object under the node-aware `remote_prefix` into
    /// `destination_dir`, keeping its file name
    pub fn download_node_file_to_dir<P>(
        &self,
        destination_dir: &Path,
        remote_prefix: impl AsRef<Path>,
        filter: &P,
    ) -> Result<PathBuf>
    where
        P: KeyPredicate + ?Sized,
    {
        let reference = self.select_unique_object(remote_prefix, filter)?;
        let file_name = last_segment(reference.canonical_path());
        let destination = destination_dir.join(file_name);

        self.download_file(&destination, &reference)?;
        info!("Downloaded {} to {}", reference, destination.display());

        Ok(destination)
    }

    /// Hand every object under the directory `prefix` to `consumer` as
    /// listing pages arrive
    ///
    /// `prefix` names a directory: it is listed as `canonical_path/`, so a
    /// node prefix `c1/dc1/n1` never picks up `c1/dc1/n10/...`. Keys inside
    /// this node's namespace come back as node-aware references relative to
    /// it; anything else comes back as a bare reference.
    pub fn consume_files<F>(&self, prefix: &RemoteObjectReference, mut consumer: F) -> Result<()>
    where
        F: FnMut(RemoteObjectReference),
    {
        let directory = directory_prefix(prefix.canonical_path());
        debug!("Enumerating objects under {}", directory);
        listing::for_each_matching(
            &self.client,
            self.bucket(),
            &directory,
            &KeyFilter::Any,
            |summary| {
                let reference = match self.location.relativize(&summary.key) {
                    Some(relative) => self.location.resolve_node_aware_reference(relative),
                    None => resolve_bare_reference(&summary.key),
                };
                consumer(reference)
            },
        )
    }
}

/// `key` as a `/`-terminated directory prefix; the bucket root stays empty
fn directory_prefix(key: &str) -> String {
    if key.is_empty() || key.ends_with('/') {
        key.to_string()
    } else {
        format!("{}/", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn restorer() -> Restorer<InMemoryObjectStore> {
        let store = InMemoryObjectStore::with_page_size(2);
        store.put_object("backups", "c1/dc1/n1/manifests/manifest-20230101.json", b"old");
        store.put_object("backups", "c1/dc1/n1/manifests/manifest-20230215.json", b"new");
        store.put_object("backups", "c1/dc1/n1/schema/schema-1.cql", b"CREATE TABLE");
        store.put_object("backups", "topology/c1.json", b"{}");
        let location = StorageLocation::new("backups", "c1", "dc1", "n1").unwrap();
        Restorer::new(store, location)
    }

    #[test]
    fn test_select_manifest_rebases_onto_local_prefix() {
        let restorer = restorer();
        let reference = restorer.select_manifest("manifests", &KeyFilter::Any).unwrap();
        assert_eq!(reference.object_key(), Path::new("manifests/manifest-20230215.json"));
        assert_eq!(
            reference.canonical_path(),
            "c1/dc1/n1/manifests/manifest-20230215.json"
        );
    }

    #[test]
    fn test_download_node_file_to_string() {
        let restorer = restorer();
        let text = restorer
            .download_node_file_to_string("schema", &KeyFilter::suffix(".cql"))
            .unwrap();
        assert_eq!(text, "CREATE TABLE");
    }

    #[test]
    fn test_bare_unique_lookup() {
        let restorer = restorer();
        let text = restorer
            .download_file_to_string_matching("topology", &KeyFilter::contains("c1"))
            .unwrap();
        assert_eq!(text, "{}");
    }

    #[test]
    fn test_consume_files_stays_inside_directory() {
        let restorer = restorer();
        restorer
            .client()
            .put_object("backups", "c1/dc1/n10/manifests/manifest-20240101.json", b"neighbour");
        restorer
            .client()
            .put_object("backups", "c1/dc1/n1-old/schema.cql", b"stale");

        let prefix = restorer.object_key_to_node_aware_remote_reference("");
        let mut canonical = Vec::new();
        restorer
            .consume_files(&prefix, |r| canonical.push(r.canonical_path().to_string()))
            .unwrap();

        assert_eq!(canonical.len(), 3);
        assert!(canonical.iter().all(|k| k.starts_with("c1/dc1/n1/")));

        let mut bare = Vec::new();
        restorer
            .consume_files(&resolve_bare_reference("topology"), |r| bare.push(r))
            .unwrap();
        assert_eq!(bare, vec![resolve_bare_reference("topology/c1.json")]);
    }

    #[test]
    fn test_directory_prefix() {
        assert_eq!(directory_prefix(""), "");
        assert_eq!(directory_prefix("c1/dc1/n1"), "c1/dc1/n1/");
        assert_eq!(directory_prefix("c1/dc1/n1/"), "c1/dc1/n1/");
    }

    #[test]
    fn test_consume_files_relativizes() {
        let restorer = restorer();
        let prefix = restorer.object_key_to_node_aware_remote_reference("");
        let mut keys = Vec::new();
        restorer
            .consume_files(&prefix, |r| keys.push(r.object_key().to_path_buf()))
            .unwrap();

        assert_eq!(
            keys,
            vec![
                PathBuf::from("manifests/manifest-20230101.json"),
                PathBuf::from("manifests/manifest-20230215.json"),
                PathBuf::from("schema/schema-1.cql"),
            ]
        );
    }
}
