//! Retry-classified downloads
//!
//! Each attempt creates the parent directory, hands the transfer to the
//! backend and, on failure, deletes whatever was written before the error is
//! classified. A retried attempt therefore always starts from scratch.

use crate::core::client::{ObjectStorageClient, ProgressEvent, ProgressListener, StorageError};
use crate::core::reference::RemoteObjectReference;
use crate::core::retry::RetryPolicy;
use crate::error::{RestoreError, Result};
use std::path::Path;
use tracing::{debug, error, warn};

/// Logs transfer completion for one reference, then forwards every event
/// to an optional observer
pub struct DownloadProgressListener<'a> {
    reference: &'a RemoteObjectReference,
    observer: Option<&'a dyn ProgressListener>,
}

impl<'a> DownloadProgressListener<'a> {
    pub fn new(reference: &'a RemoteObjectReference) -> Self {
        Self {
            reference,
            observer: None,
        }
    }

    pub fn with_observer(reference: &'a RemoteObjectReference, observer: &'a dyn ProgressListener) -> Self {
        Self {
            reference,
            observer: Some(observer),
        }
    }
}

impl ProgressListener for DownloadProgressListener<'_> {
    fn progress_changed(&self, event: ProgressEvent) {
        // Downloads are never resumed, so only completion is interesting
        if event == ProgressEvent::Completed {
            debug!("Successfully downloaded {}.", self.reference.canonical_path());
        }
        if let Some(observer) = self.observer {
            observer.progress_changed(event);
        }
    }
}

/// Download `reference` to `local_path` under `retry`
///
/// On success `local_path` holds the complete object. On failure it does
/// not exist.
pub fn download_file<C, R>(
    client: &C,
    retry: &R,
    bucket: &str,
    local_path: &Path,
    reference: &RemoteObjectReference,
) -> Result<()>
where
    C: ObjectStorageClient + ?Sized,
    R: RetryPolicy,
{
    retry.submit(|| attempt_download(client, bucket, local_path, reference, None))
}

/// [`download_file`] that also reports transfer events of every attempt to
/// `observer`
///
/// The observer sees events only; it cannot affect the outcome.
pub fn download_file_with_progress<C, R>(
    client: &C,
    retry: &R,
    bucket: &str,
    local_path: &Path,
    reference: &RemoteObjectReference,
    observer: &dyn ProgressListener,
) -> Result<()>
where
    C: ObjectStorageClient + ?Sized,
    R: RetryPolicy,
{
    retry.submit(|| attempt_download(client, bucket, local_path, reference, Some(observer)))
}

fn attempt_download<C>(
    client: &C,
    bucket: &str,
    local_path: &Path,
    reference: &RemoteObjectReference,
    observer: Option<&dyn ProgressListener>,
) -> Result<()>
where
    C: ObjectStorageClient + ?Sized,
{
    if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| RestoreError::LocalIo {
            path: parent.display().to_string(),
            source: StorageError::Io(e),
        })?;
    }

    let listener = match observer {
        Some(observer) => DownloadProgressListener::with_observer(reference, observer),
        None => DownloadProgressListener::new(reference),
    };
    let failure = match client.download(bucket, reference.canonical_path(), local_path, &listener) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    remove_partial_file(local_path)?;
    Err(classify_download_error(reference, local_path, failure))
}

/// Delete a partially written file, if any
fn remove_partial_file(local_path: &Path) -> Result<()> {
    match std::fs::remove_file(local_path) {
        Ok(()) => {
            debug!("Removed partially downloaded file {}", local_path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(
                "Could not remove partially downloaded file {}: {}",
                local_path.display(),
                e
            );
            Err(RestoreError::LocalIo {
                path: local_path.display().to_string(),
                source: StorageError::Io(e),
            })
        }
    }
}

/// Map a backend failure onto the restore error taxonomy
///
/// Only statuses above 500 and transport errors are retriable. 404 means the
/// object does not exist. Local write failures and cancellations are fatal.
pub(crate) fn classify_download_error(
    reference: &RemoteObjectReference,
    local_path: &Path,
    failure: StorageError,
) -> RestoreError {
    let key = reference.canonical_path().to_string();
    match failure.status() {
        Some(status) if status > 500 => RestoreError::Retriable {
            key,
            source: failure,
        },
        Some(404) => {
            error!("Remote object reference {} does not exist.", reference);
            RestoreError::NotFound(key)
        }
        Some(_) => RestoreError::Fatal {
            key,
            source: failure,
        },
        None if failure.is_transient() => RestoreError::Retriable {
            key,
            source: failure,
        },
        None => RestoreError::LocalIo {
            path: local_path.display().to_string(),
            source: failure,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reference::resolve_bare_reference;
    use crate::error::ErrorKind;

    fn kind_of(failure: StorageError) -> ErrorKind {
        let reference = resolve_bare_reference("data/a.db");
        classify_download_error(&reference, Path::new("/tmp/a.db"), failure).kind()
    }

    #[test]
    fn test_classification() {
        assert_eq!(kind_of(StorageError::service(503, "x")), ErrorKind::Retriable);
        assert_eq!(kind_of(StorageError::service(502, "x")), ErrorKind::Retriable);
        assert_eq!(kind_of(StorageError::service(500, "x")), ErrorKind::Fatal);
        assert_eq!(kind_of(StorageError::service(404, "x")), ErrorKind::NotFound);
        assert_eq!(kind_of(StorageError::service(403, "x")), ErrorKind::Fatal);
        assert_eq!(kind_of(StorageError::service(400, "x")), ErrorKind::Fatal);
        assert_eq!(
            kind_of(StorageError::Client("connection reset".into())),
            ErrorKind::Retriable
        );
        assert_eq!(kind_of(StorageError::Cancelled), ErrorKind::Fatal);
        assert_eq!(
            kind_of(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full"
            ))),
            ErrorKind::Fatal
        );
    }

    #[test]
    fn test_local_failure_is_local_io() {
        let reference = resolve_bare_reference("data/a.db");
        let err = classify_download_error(&reference, Path::new("/tmp/a.db"), StorageError::Cancelled);
        assert!(matches!(err, RestoreError::LocalIo { .. }));
    }
}
