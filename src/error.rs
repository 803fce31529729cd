//! Error types for restore operations

use crate::core::client::StorageError;
use thiserror::Error;

/// Restore operation result type
pub type Result<T> = std::result::Result<T, RestoreError>;

/// How a failure is treated by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient; the retry policy may attempt the operation again
    Retriable,
    /// Permanent; propagated immediately
    Fatal,
    /// The remote object does not exist; permanent
    NotFound,
}

/// Restore operation errors
#[derive(Error, Debug)]
pub enum RestoreError {
    /// Remote object is absent (service status 404)
    #[error("Remote object does not exist: {0}")]
    NotFound(String),

    /// Transient service (> 500) or transport failure
    #[error("Retriable error while downloading {key}: {source}")]
    Retriable {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Service failure that retrying will not fix
    #[error("Fatal error while downloading {key}: {source}")]
    Fatal {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Local disk failure or cancelled transfer
    #[error("Local I/O error for {path}: {source}")]
    LocalIo {
        path: String,
        #[source]
        source: StorageError,
    },

    /// No candidate manifest under the prefix
    #[error("There is no manifest requested found under {0}")]
    NoManifestFound(String),

    /// Candidate set is not exactly one object
    #[error("There is not one key under {prefix} which satisfies key filter: {keys:?}")]
    AmbiguousOrMissingObject { prefix: String, keys: Vec<String> },

    /// Retry policy gave up
    #[error("Operation failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<RestoreError>,
    },

    /// Listing or text read failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Object content is not valid UTF-8
    #[error("Object {key} is not valid UTF-8: {source}")]
    Decode {
        key: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// Invalid configuration or storage location
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error outside of a transfer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RestoreError {
    /// Classification consulted by [`RetryPolicy`](crate::RetryPolicy) implementations
    pub fn kind(&self) -> ErrorKind {
        match self {
            RestoreError::NotFound(_) => ErrorKind::NotFound,
            RestoreError::Retriable { .. } => ErrorKind::Retriable,
            RestoreError::Storage(source) => match source {
                StorageError::Service { status: 404, .. } => ErrorKind::NotFound,
                e if e.is_transient() => ErrorKind::Retriable,
                _ => ErrorKind::Fatal,
            },
            _ => ErrorKind::Fatal,
        }
    }

    /// True when the error is [`ErrorKind::Retriable`]
    pub fn is_retriable(&self) -> bool {
        self.kind() == ErrorKind::Retriable
    }
}
