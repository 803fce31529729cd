//! Directory-backed object store
//!
//! Buckets are top-level directories under a root; object keys are paths
//! relative to the bucket directory. Empty directories are reported as
//! directory markers (`key/`), the way object stores expose folder
//! placeholders.

use crate::core::client::{
    ListingPage, ObjectStorageClient, ObjectSummary, ProgressEvent, ProgressListener,
    StorageError, StorageResult,
};
use crate::core::memory::DEFAULT_PAGE_SIZE;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Object store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalDirectoryStore {
    root: PathBuf,
    page_size: usize,
}

impl LocalDirectoryStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> StorageResult<PathBuf> {
        if bucket.is_empty() || bucket == "." || bucket == ".." || bucket.contains(['/', '\\']) {
            return Err(StorageError::service(400, format!("InvalidBucketName: {}", bucket)));
        }
        let dir = self.root.join(bucket);
        if !dir.is_dir() {
            return Err(StorageError::service(404, format!("NoSuchBucket: {}", bucket)));
        }
        Ok(dir)
    }

    fn object_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(invalid_key(key));
        }
        check_contained(key)?;
        Ok(self.bucket_dir(bucket)?.join(key))
    }

    fn page(&self, bucket: &str, prefix: &str, after: Option<&str>) -> StorageResult<ListingPage> {
        check_contained(prefix)?;
        let bucket_dir = self.bucket_dir(bucket)?;

        // Only walk the directory the prefix is guaranteed to live in
        let start = match prefix.rfind('/') {
            Some(slash) => &prefix[..slash],
            None => "",
        };

        let mut entries = Vec::new();
        collect_entries(&bucket_dir, start, &mut entries)?;
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let mut matching = entries
            .into_iter()
            .filter(|s| s.key.starts_with(prefix))
            .filter(|s| after.map_or(true, |marker| s.key.as_str() > marker));

        let summaries: Vec<ObjectSummary> = matching.by_ref().take(self.page_size).collect();
        let truncated = matching.next().is_some();
        let next_marker = if truncated {
            summaries.last().map(|s| s.key.clone())
        } else {
            None
        };

        Ok(ListingPage {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            summaries,
            truncated,
            next_marker,
        })
    }
}

fn invalid_key(key: &str) -> StorageError {
    StorageError::service(400, format!("InvalidKey: {}", key))
}

/// Keys and prefixes must stay inside the bucket directory
fn check_contained(key: &str) -> StorageResult<()> {
    let escapes = key.starts_with('/')
        || key.starts_with('\\')
        || Path::new(key).is_absolute()
        || key.split(['/', '\\']).any(|segment| segment == "..");
    if escapes {
        return Err(invalid_key(key));
    }
    Ok(())
}

/// Walk `bucket_dir/relative` and record every file and empty directory
fn collect_entries(bucket_dir: &Path, relative: &str, out: &mut Vec<ObjectSummary>) -> StorageResult<()> {
    let dir = if relative.is_empty() {
        bucket_dir.to_path_buf()
    } else {
        bucket_dir.join(relative)
    };

    let read_dir = match fs::read_dir(&dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StorageError::Client(format!("cannot list {}: {}", dir.display(), e))),
    };

    let mut empty = true;
    for entry in read_dir {
        empty = false;
        let entry = entry.map_err(|e| StorageError::Client(e.to_string()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let key = if relative.is_empty() {
            name
        } else {
            format!("{}/{}", relative, name)
        };

        let metadata = entry.metadata().map_err(|e| StorageError::Client(e.to_string()))?;
        if metadata.is_dir() {
            collect_entries(bucket_dir, &key, out)?;
        } else {
            out.push(ObjectSummary {
                key,
                size: metadata.len(),
                last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }
    }

    if empty && !relative.is_empty() {
        out.push(ObjectSummary::new(format!("{}/", relative), 0));
    }

    Ok(())
}

fn open_source(path: &Path, key: &str) -> StorageResult<File> {
    File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => StorageError::service(404, format!("NoSuchKey: {}", key)),
        ErrorKind::PermissionDenied => StorageError::service(403, format!("AccessDenied: {}", key)),
        _ => StorageError::Client(format!("cannot open {}: {}", key, e)),
    })
}

impl ObjectStorageClient for LocalDirectoryStore {
    fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Box<dyn Read + Send>> {
        let path = self.object_path(bucket, key)?;
        Ok(Box::new(open_source(&path, key)?))
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<ListingPage> {
        self.page(bucket, prefix, None)
    }

    fn list_next_page(&self, previous: &ListingPage) -> StorageResult<ListingPage> {
        let marker = previous.next_marker.as_deref().ok_or_else(|| {
            StorageError::Client("listing page has no continuation marker".to_string())
        })?;
        self.page(&previous.bucket, &previous.prefix, Some(marker))
    }

    fn download(
        &self,
        bucket: &str,
        key: &str,
        local_file: &Path,
        progress: &dyn ProgressListener,
    ) -> StorageResult<()> {
        let source_path = self.object_path(bucket, key)?;
        let mut source = open_source(&source_path, key)?;
        let total_bytes = source.metadata().ok().map(|m| m.len());

        progress.progress_changed(ProgressEvent::Started { total_bytes });

        let mut target = File::create(local_file)?;
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut transferred = 0u64;

        loop {
            let read = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    progress.progress_changed(ProgressEvent::Failed);
                    return Err(StorageError::Client(format!("read of {} failed: {}", key, e)));
                }
            };
            if let Err(e) = target.write_all(&buffer[..read]) {
                progress.progress_changed(ProgressEvent::Failed);
                return Err(StorageError::Io(e));
            }
            transferred += read as u64;
            progress.progress_changed(ProgressEvent::BytesTransferred(transferred));
        }

        target.sync_all()?;
        debug!("Copied {} bytes of {}/{}", transferred, bucket, key);
        progress.progress_changed(ProgressEvent::Completed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::NoProgress;

    fn populate(root: &Path) {
        let node = root.join("backups/c1/dc1/n1");
        fs::create_dir_all(node.join("manifests")).unwrap();
        fs::create_dir_all(node.join("empty")).unwrap();
        fs::write(node.join("manifests/manifest-20230101.json"), b"old").unwrap();
        fs::write(node.join("manifests/manifest-20230215.json"), b"new").unwrap();
        fs::write(node.join("schema.cql"), b"CREATE").unwrap();
    }

    #[test]
    fn test_listing_with_markers() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let store = LocalDirectoryStore::new(dir.path());

        let page = store.list_objects("backups", "c1/dc1/n1/").unwrap();
        let keys: Vec<_> = page.summaries.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "c1/dc1/n1/empty/",
                "c1/dc1/n1/manifests/manifest-20230101.json",
                "c1/dc1/n1/manifests/manifest-20230215.json",
                "c1/dc1/n1/schema.cql",
            ]
        );
        assert!(!page.truncated);
    }

    #[test]
    fn test_paging() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let store = LocalDirectoryStore::new(dir.path()).with_page_size(1);

        let first = store.list_objects("backups", "c1/dc1/n1/manifests").unwrap();
        assert!(first.truncated);
        let second = store.list_next_page(&first).unwrap();
        assert!(!second.truncated);
        assert_eq!(second.summaries[0].key, "c1/dc1/n1/manifests/manifest-20230215.json");
    }

    #[test]
    fn test_missing_bucket_and_key() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let store = LocalDirectoryStore::new(dir.path());

        let err = store.list_objects("absent", "").unwrap_err();
        assert_eq!(err.status(), Some(404));

        let err = store.get_object("backups", "c1/nope").err().unwrap();
        assert_eq!(err.status(), Some(404));

        let err = store.get_object("backups", "../escape").err().unwrap();
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_keys_cannot_leave_root() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let outside = dir.path().join("secret.txt");
        fs::write(&outside, b"outside-root").unwrap();
        fs::create_dir_all(dir.path().join("other")).unwrap();
        fs::write(dir.path().join("other/x.db"), b"x").unwrap();
        let store = LocalDirectoryStore::new(dir.path());

        let absolute = outside.display().to_string();
        let err = store.get_object("backups", &absolute).err().unwrap();
        assert_eq!(err.status(), Some(400));

        let target = dir.path().join("copy.txt");
        let err = store
            .download("backups", &absolute, &target, &NoProgress)
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(!target.exists());

        let err = store.get_object("backups", "c1/../../secret.txt").err().unwrap();
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_prefixes_cannot_leave_root() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        fs::create_dir_all(dir.path().join("other")).unwrap();
        fs::write(dir.path().join("other/x.db"), b"x").unwrap();
        let store = LocalDirectoryStore::new(dir.path());

        let err = store.list_objects("backups", "../other/").unwrap_err();
        assert_eq!(err.status(), Some(400));

        let err = store.list_objects("backups", "/etc/").unwrap_err();
        assert_eq!(err.status(), Some(400));

        let err = store.list_objects("backups", "c1/../../other").unwrap_err();
        assert_eq!(err.status(), Some(400));

        let err = store.list_objects("../other", "").unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_download_copies_content() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let store = LocalDirectoryStore::new(dir.path());
        let target = dir.path().join("out.cql");

        store
            .download("backups", "c1/dc1/n1/schema.cql", &target, &NoProgress)
            .unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"CREATE");
    }
}
