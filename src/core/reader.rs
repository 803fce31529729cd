//! Text reads of small remote objects (manifests, schemas, tokens)
//!
//! Reads are never retried; a failure goes straight back to the caller.

use crate::core::client::{ObjectStorageClient, StorageError};
use crate::core::reference::RemoteObjectReference;
use crate::error::{RestoreError, Result};
use std::io::Read;

/// Fetch the whole object behind `reference` as UTF-8 text
///
/// The content stream is dropped on every exit path.
pub fn read_as_string<C>(client: &C, bucket: &str, reference: &RemoteObjectReference) -> Result<String>
where
    C: ObjectStorageClient + ?Sized,
{
    let mut stream = client.get_object(bucket, reference.canonical_path())?;

    // A stream that breaks mid-read is a transport failure, not a local one
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).map_err(|e| {
        StorageError::Client(format!("read of {} failed: {}", reference.canonical_path(), e))
    })?;

    String::from_utf8(bytes).map_err(|source| RestoreError::Decode {
        key: reference.canonical_path().to_string(),
        source,
    })
}
