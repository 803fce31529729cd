//! In-memory object store backend
//!
//! Keeps objects in sorted maps so listings come back in key order, serves
//! them in pages of a configurable size, and can be told to fail upcoming
//! transfers. Used by the test suites and benchmarks, and handy as a
//! reference for what a backend must honour.

use crate::core::client::{
    ListingPage, ObjectStorageClient, ObjectSummary, ProgressEvent, ProgressListener,
    StorageError, StorageResult,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{Cursor, Read, Write};
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default number of summaries per listing page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Failure to inject into the next transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Service error with the given status
    Service(u16),
    /// Transport failure (e.g. connection reset)
    Transport,
    /// Local write failure
    LocalIo,
    /// Transfer interrupted
    Cancelled,
}

impl Fault {
    fn into_error(self) -> StorageError {
        match self {
            Fault::Service(status) => StorageError::service(status, "injected service failure"),
            Fault::Transport => StorageError::Client("connection reset by peer".to_string()),
            Fault::LocalIo => StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "no space left on device",
            )),
            Fault::Cancelled => StorageError::Cancelled,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// Object store held entirely in memory
pub struct InMemoryObjectStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
    page_size: usize,
    download_faults: Mutex<VecDeque<(Fault, usize)>>,
    get_faults: Mutex<VecDeque<Fault>>,
    list_calls: AtomicUsize,
    download_attempts: AtomicUsize,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that returns at most `page_size` summaries per page (minimum 1)
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
            download_faults: Mutex::new(VecDeque::new()),
            get_faults: Mutex::new(VecDeque::new()),
            list_calls: AtomicUsize::new(0),
            download_attempts: AtomicUsize::new(0),
        }
    }

    /// Insert or overwrite an object
    pub fn put_object(&self, bucket: &str, key: &str, data: &[u8]) {
        let mut buckets = self.buckets.write();
        buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                last_modified: Utc::now(),
            },
        );
    }

    pub fn delete_object(&self, bucket: &str, key: &str) -> bool {
        let mut buckets = self.buckets.write();
        buckets
            .get_mut(bucket)
            .map(|objects| objects.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Fail the next download after writing `bytes_written` bytes of the object
    pub fn fail_next_download(&self, fault: Fault, bytes_written: usize) {
        self.download_faults.lock().push_back((fault, bytes_written));
    }

    /// Fail the next `get_object` call
    pub fn fail_next_get(&self, fault: Fault) {
        self.get_faults.lock().push_back(fault);
    }

    /// Number of listing page requests served so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of download attempts received so far
    pub fn download_attempts(&self) -> usize {
        self.download_attempts.load(Ordering::SeqCst)
    }

    fn page(&self, bucket: &str, prefix: &str, after: Option<&str>) -> ListingPage {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let buckets = self.buckets.read();
        let lower = match after {
            Some(marker) => Bound::Excluded(marker.to_string()),
            None => Bound::Included(prefix.to_string()),
        };

        let mut matching = buckets
            .get(bucket)
            .into_iter()
            .flat_map(|objects| objects.range((lower.clone(), Bound::Unbounded)))
            .take_while(|(key, _)| key.starts_with(prefix));

        let summaries: Vec<ObjectSummary> = matching
            .by_ref()
            .take(self.page_size)
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: Some(object.last_modified),
            })
            .collect();

        let truncated = matching.next().is_some();
        let next_marker = if truncated {
            summaries.last().map(|s| s.key.clone())
        } else {
            None
        };

        ListingPage {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            summaries,
            truncated,
            next_marker,
        }
    }

    fn object_data(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let buckets = self.buckets.read();
        buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::service(404, format!("NoSuchKey: {}/{}", bucket, key)))
    }
}

impl ObjectStorageClient for InMemoryObjectStore {
    fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Box<dyn Read + Send>> {
        if let Some(fault) = self.get_faults.lock().pop_front() {
            return Err(fault.into_error());
        }
        let data = self.object_data(bucket, key)?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<ListingPage> {
        Ok(self.page(bucket, prefix, None))
    }

    fn list_next_page(&self, previous: &ListingPage) -> StorageResult<ListingPage> {
        let marker = previous.next_marker.as_deref().ok_or_else(|| {
            StorageError::Client("listing page has no continuation marker".to_string())
        })?;
        Ok(self.page(&previous.bucket, &previous.prefix, Some(marker)))
    }

    fn download(
        &self,
        bucket: &str,
        key: &str,
        local_file: &Path,
        progress: &dyn ProgressListener,
    ) -> StorageResult<()> {
        self.download_attempts.fetch_add(1, Ordering::SeqCst);

        let injected = self.download_faults.lock().pop_front();
        let data = match (self.object_data(bucket, key), injected) {
            (Ok(data), _) => data,
            (Err(e), None) => return Err(e),
            // An injected fault wins over a missing object
            (Err(_), Some(_)) => Vec::new(),
        };

        progress.progress_changed(ProgressEvent::Started {
            total_bytes: Some(data.len() as u64),
        });

        let mut file = std::fs::File::create(local_file)?;

        if let Some((fault, bytes_written)) = injected {
            let partial = &data[..bytes_written.min(data.len())];
            file.write_all(partial)?;
            progress.progress_changed(ProgressEvent::BytesTransferred(partial.len() as u64));
            progress.progress_changed(ProgressEvent::Failed);
            return Err(fault.into_error());
        }

        file.write_all(&data)?;
        file.sync_all()?;
        progress.progress_changed(ProgressEvent::BytesTransferred(data.len() as u64));
        progress.progress_changed(ProgressEvent::Completed);
        Ok(())
    }
}
