//! Manifest and single-object selection
//!
//! Manifests carry a sortable timestamp at the end of their file name, e.g.
//! `manifest-20230215.json` or `snap1-1676419200000.json`. The latest
//! manifest is the candidate with the greatest timestamp.

use crate::core::client::{ObjectStorageClient, ObjectSummary};
use crate::core::filter::KeyPredicate;
use crate::core::listing::list_matching;
use crate::core::reference::last_segment;
use crate::error::{RestoreError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::cmp::Ordering;

/// Timestamp embedded in a manifest file name
///
/// Held as its digit string so arbitrarily long timestamps still compare
/// numerically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestTimestamp(String);

impl ManifestTimestamp {
    /// Trailing digits of the file stem of `remote_key`
    pub fn parse(remote_key: &str) -> Option<Self> {
        let name = last_segment(remote_key);
        let stem = match name.rfind('.') {
            Some(dot) if dot > 0 => &name[..dot],
            _ => name,
        };

        let digits_start = stem
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)?;

        let digits = stem[digits_start..].trim_start_matches('0');
        Some(ManifestTimestamp(if digits.is_empty() {
            "0".to_string()
        } else {
            digits.to_string()
        }))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret the digits as a point in time, when they look like one
    ///
    /// Recognised: `YYYYMMDD`, `YYYYMMDDhhmmss`, epoch seconds (10 digits)
    /// and epoch milliseconds (13 digits).
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let digits = self.0.as_str();
        match digits.len() {
            8 => NaiveDate::parse_from_str(digits, "%Y%m%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| Utc.from_utc_datetime(&dt)),
            14 => NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
                .ok()
                .map(|dt| Utc.from_utc_datetime(&dt)),
            10 => digits
                .parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            13 => digits
                .parse::<i64>()
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            _ => None,
        }
    }
}

impl Ord for ManifestTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        // No leading zeros, so longer means larger
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for ManifestTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Order candidates by embedded timestamp, then by full key
///
/// Keys without a timestamp sort below every key with one.
fn compare_candidates(a: &str, b: &str) -> Ordering {
    ManifestTimestamp::parse(a)
        .cmp(&ManifestTimestamp::parse(b))
        .then_with(|| a.cmp(b))
}

/// Key of the latest manifest among `keys`, regardless of their order
pub fn select_latest_key<'a, I>(keys: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    keys.into_iter().max_by(|a, b| compare_candidates(a, b))
}

/// Latest manifest among the candidates listed under `prefix`
pub fn select_latest(prefix: &str, candidates: Vec<ObjectSummary>) -> Result<ObjectSummary> {
    candidates
        .into_iter()
        .max_by(|a, b| compare_candidates(&a.key, &b.key))
        .ok_or_else(|| RestoreError::NoManifestFound(prefix.to_string()))
}

/// The only candidate listed under `prefix`
pub fn select_unique(prefix: &str, candidates: Vec<ObjectSummary>) -> Result<ObjectSummary> {
    if candidates.len() != 1 {
        return Err(RestoreError::AmbiguousOrMissingObject {
            prefix: prefix.to_string(),
            keys: candidates.into_iter().map(|s| s.key).collect(),
        });
    }
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| RestoreError::AmbiguousOrMissingObject {
            prefix: prefix.to_string(),
            keys: Vec::new(),
        })
}

/// List `prefix` and pick the latest manifest
pub fn find_latest_manifest<C, P>(
    client: &C,
    bucket: &str,
    prefix: &str,
    predicate: &P,
) -> Result<ObjectSummary>
where
    C: ObjectStorageClient + ?Sized,
    P: KeyPredicate + ?Sized,
{
    select_latest(prefix, list_matching(client, bucket, prefix, predicate)?)
}

/// List `prefix` and require exactly one match
pub fn find_unique_object<C, P>(
    client: &C,
    bucket: &str,
    prefix: &str,
    predicate: &P,
) -> Result<ObjectSummary>
where
    C: ObjectStorageClient + ?Sized,
    P: KeyPredicate + ?Sized,
{
    select_unique(prefix, list_matching(client, bucket, prefix, predicate)?)
}
