//! Paginated listing with directory exclusion and key filtering
//!
//! [`Pages`] pulls one [`ListingPage`] at a time from the backend and only
//! asks for the next page once the caller moves past the current one.
//! [`Matches`] flattens the pages and applies the filtering rule. Both the
//! materializing ([`list_matching`]) and streaming ([`for_each_matching`])
//! modes are built on it, so they always agree on the match set.

use crate::core::client::{ListingPage, ObjectStorageClient, ObjectSummary, StorageResult};
use crate::core::filter::KeyPredicate;
use crate::error::Result;
use tracing::debug;

enum PageState {
    Start { bucket: String, prefix: String },
    Next(ListingPage),
    Done,
}

/// Lazy sequence of listing pages
///
/// Ends after the first page reporting `truncated == false`, or after the
/// first error. There is no page-count bound.
pub struct Pages<'a, C: ?Sized> {
    client: &'a C,
    state: PageState,
}

impl<'a, C: ObjectStorageClient + ?Sized> Pages<'a, C> {
    pub fn new(client: &'a C, bucket: &str, prefix: &str) -> Self {
        Self {
            client,
            state: PageState::Start {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            },
        }
    }
}

impl<'a, C: ObjectStorageClient + ?Sized> Iterator for Pages<'a, C> {
    type Item = StorageResult<ListingPage>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match std::mem::replace(&mut self.state, PageState::Done) {
            PageState::Start { bucket, prefix } => self.client.list_objects(&bucket, &prefix),
            PageState::Next(previous) => self.client.list_next_page(&previous),
            PageState::Done => return None,
        };

        match result {
            Ok(page) => {
                debug!(
                    "Listed page of {} objects under {} (truncated={})",
                    page.summaries.len(),
                    page.prefix,
                    page.truncated
                );
                if page.truncated {
                    // Only the continuation metadata survives; summaries go to the caller
                    self.state = PageState::Next(ListingPage {
                        bucket: page.bucket.clone(),
                        prefix: page.prefix.clone(),
                        summaries: Vec::new(),
                        truncated: true,
                        next_marker: page.next_marker.clone(),
                    });
                }
                Some(Ok(page))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Summaries accepted by the listing filter, in listing order
pub struct Matches<'a, C: ?Sized, P: ?Sized> {
    pages: Pages<'a, C>,
    current: std::vec::IntoIter<ObjectSummary>,
    prefix: String,
    predicate: &'a P,
}

impl<'a, C, P> Matches<'a, C, P>
where
    C: ObjectStorageClient + ?Sized,
    P: KeyPredicate + ?Sized,
{
    pub fn new(client: &'a C, bucket: &str, prefix: &str, predicate: &'a P) -> Self {
        Self {
            pages: Pages::new(client, bucket, prefix),
            current: Vec::new().into_iter(),
            prefix: prefix.to_string(),
            predicate,
        }
    }

    fn accepts(&self, summary: &ObjectSummary) -> bool {
        summary.key.starts_with(&self.prefix)
            && !summary.is_directory_marker()
            && self.predicate.test(&summary.key)
    }
}

impl<'a, C, P> Iterator for Matches<'a, C, P>
where
    C: ObjectStorageClient + ?Sized,
    P: KeyPredicate + ?Sized,
{
    type Item = StorageResult<ObjectSummary>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            while let Some(summary) = self.current.next() {
                if self.accepts(&summary) {
                    return Some(Ok(summary));
                }
            }

            match self.pages.next()? {
                Ok(page) => self.current = page.summaries.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Collect every match under `prefix` into a vector
pub fn list_matching<C, P>(
    client: &C,
    bucket: &str,
    prefix: &str,
    predicate: &P,
) -> Result<Vec<ObjectSummary>>
where
    C: ObjectStorageClient + ?Sized,
    P: KeyPredicate + ?Sized,
{
    let summaries = Matches::new(client, bucket, prefix, predicate).collect::<StorageResult<Vec<_>>>()?;
    Ok(summaries)
}

/// Hand every match under `prefix` to `consumer` as pages arrive
pub fn for_each_matching<C, P, F>(
    client: &C,
    bucket: &str,
    prefix: &str,
    predicate: &P,
    mut consumer: F,
) -> Result<()>
where
    C: ObjectStorageClient + ?Sized,
    P: KeyPredicate + ?Sized,
    F: FnMut(ObjectSummary),
{
    for summary in Matches::new(client, bucket, prefix, predicate) {
        consumer(summary?);
    }
    Ok(())
}
