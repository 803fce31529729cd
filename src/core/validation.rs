//! Validation for bucket names and node-aware path segments
//!
//! A [`StorageLocation`](super::reference::StorageLocation) is supplied from
//! configuration, so its pieces are checked once up front. After that the
//! reference resolver can treat them as well formed and never fail.

use crate::error::{RestoreError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Pattern for bucket names (lowercase letters, digits, dots, hyphens)
const BUCKET_PATTERN: &str = r"^[a-z0-9][a-z0-9.-]*[a-z0-9]$";

static BUCKET_REGEX: OnceLock<Regex> = OnceLock::new();

fn bucket_regex() -> Result<&'static Regex> {
    if let Some(re) = BUCKET_REGEX.get() {
        return Ok(re);
    }
    let re = Regex::new(BUCKET_PATTERN).map_err(|e| RestoreError::Config(e.to_string()))?;
    Ok(BUCKET_REGEX.get_or_init(|| re))
}

/// Validate a bucket name according to S3 naming rules
///
/// These are stricter than what some S3-compatible stores (Ceph RGW among
/// them) accept; such buckets must be renamed or aliased first.
///
/// # Rules
/// - 3-63 characters
/// - Lowercase letters, numbers, dots, hyphens
/// - Must start and end with letter or number
/// - No consecutive dots
pub fn validate_bucket_name(name: &str) -> Result<()> {
    if name.len() < 3 || name.len() > 63 {
        return Err(RestoreError::Config(format!(
            "bucket name must be 3-63 characters, got {}",
            name.len()
        )));
    }

    if !bucket_regex()?.is_match(name) {
        return Err(RestoreError::Config(format!(
            "bucket name '{}' must contain only lowercase letters, numbers, dots, and hyphens, \
             and start and end with a letter or number",
            name
        )));
    }

    if name.contains("..") {
        return Err(RestoreError::Config(
            "bucket name cannot contain consecutive dots".to_string(),
        ));
    }

    Ok(())
}

/// Validate one segment of the node-aware prefix (cluster, datacenter or node id)
///
/// `what` names the segment in the error message.
pub fn validate_segment(what: &str, segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(RestoreError::Config(format!("{} cannot be empty", what)));
    }

    if segment.contains('/') || segment.contains('\\') {
        return Err(RestoreError::Config(format!(
            "{} '{}' cannot contain path separators",
            what, segment
        )));
    }

    if segment == "." || segment == ".." {
        return Err(RestoreError::Config(format!(
            "{} '{}' is not a valid path segment",
            what, segment
        )));
    }

    Ok(())
}
