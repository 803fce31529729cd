//! Object storage client interface
//!
//! The retrieval core only talks to storage through [`ObjectStorageClient`].
//! Backends (S3-compatible services, [`InMemoryObjectStore`](super::memory::InMemoryObjectStore),
//! [`LocalDirectoryStore`](super::local::LocalDirectoryStore)) each implement it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Storage collaborator result type
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by a storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    /// The service answered with an HTTP-like status code
    #[error("service error (status {status}): {message}")]
    Service { status: u16, message: String },

    /// Client or transport failure without a status code
    #[error("client error: {0}")]
    Client(String),

    /// Local file could not be written
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transfer was interrupted before completion
    #[error("transfer cancelled")]
    Cancelled,
}

impl StorageError {
    /// Shorthand for a service error
    pub fn service(status: u16, message: impl Into<String>) -> Self {
        StorageError::Service {
            status,
            message: message.into(),
        }
    }

    /// Status code for service errors
    pub fn status(&self) -> Option<u16> {
        match self {
            StorageError::Service { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Service errors above 500 and all transport errors
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Service { status, .. } => *status > 500,
            StorageError::Client(_) => true,
            StorageError::Io(_) | StorageError::Cancelled => false,
        }
    }
}

/// One object as reported by a listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    /// Full object key within the bucket
    pub key: String,

    /// Object size in bytes
    pub size: u64,

    /// Last modified timestamp, when the backend reports one
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectSummary {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
        }
    }

    /// Keys ending in `/` are directory markers, not objects
    pub fn is_directory_marker(&self) -> bool {
        self.key.ends_with('/')
    }
}

/// One batch of a paginated listing
#[derive(Debug, Clone)]
pub struct ListingPage {
    /// Bucket the listing runs against
    pub bucket: String,

    /// Prefix the listing was requested with
    pub prefix: String,

    /// Summaries in listing order
    pub summaries: Vec<ObjectSummary>,

    /// More pages follow
    pub truncated: bool,

    /// Opaque continuation marker for the next page
    pub next_marker: Option<String>,
}

/// Transfer progress notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { total_bytes: Option<u64> },
    BytesTransferred(u64),
    Completed,
    Failed,
}

/// Observer for download progress
///
/// Notifications are observational only; they never influence the transfer.
pub trait ProgressListener: Send + Sync {
    fn progress_changed(&self, event: ProgressEvent);
}

/// Listener that ignores all events
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn progress_changed(&self, _event: ProgressEvent) {}
}

/// Low-level object storage operations - implemented by each backend
pub trait ObjectStorageClient: Send + Sync {
    /// Open the content stream of an object.
    ///
    /// The stream is closed when the returned reader is dropped.
    fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Box<dyn Read + Send>>;

    /// First page of objects whose key starts with `prefix`
    fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<ListingPage>;

    /// Page following `previous`; only called when `previous.truncated` is set
    fn list_next_page(&self, previous: &ListingPage) -> StorageResult<ListingPage>;

    /// Transfer an object into `local_file`, creating or truncating it.
    ///
    /// A failed transfer may leave a partially written file behind; callers
    /// are responsible for cleanup.
    fn download(
        &self,
        bucket: &str,
        key: &str,
        local_file: &Path,
        progress: &dyn ProgressListener,
    ) -> StorageResult<()>;
}

impl<T: ObjectStorageClient + ?Sized> ObjectStorageClient for Arc<T> {
    fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Box<dyn Read + Send>> {
        (**self).get_object(bucket, key)
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<ListingPage> {
        (**self).list_objects(bucket, prefix)
    }

    fn list_next_page(&self, previous: &ListingPage) -> StorageResult<ListingPage> {
        (**self).list_next_page(previous)
    }

    fn download(
        &self,
        bucket: &str,
        key: &str,
        local_file: &Path,
        progress: &dyn ProgressListener,
    ) -> StorageResult<()> {
        (**self).download(bucket, key, local_file, progress)
    }
}
