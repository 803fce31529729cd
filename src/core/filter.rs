//! Key predicates applied to listing results
//!
//! Any `Fn(&str) -> bool` is a [`KeyPredicate`]. [`KeyFilter`] covers the
//! common string rules plus segment-aware globs:
//! - `*` - Matches exactly one key segment (e.g., `*/manifests/*`)
//! - `**` - Matches any number of segments (e.g., `c1/**`)
//! - `*` inside a segment matches any run of characters (e.g., `*.json`, `manifest-*`)

/// Caller-supplied predicate over remote keys
pub trait KeyPredicate {
    fn test(&self, key: &str) -> bool;
}

impl<F> KeyPredicate for F
where
    F: Fn(&str) -> bool,
{
    fn test(&self, key: &str) -> bool {
        self(key)
    }
}

/// Declarative key filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    /// Accept every key
    Any,
    /// Key must contain the substring
    Contains(String),
    /// Key must start with the string
    Prefix(String),
    /// Key must end with the string
    Suffix(String),
    /// Key must match the glob pattern
    Glob(String),
}

impl KeyFilter {
    pub fn contains(s: impl Into<String>) -> Self {
        KeyFilter::Contains(s.into())
    }

    pub fn suffix(s: impl Into<String>) -> Self {
        KeyFilter::Suffix(s.into())
    }

    pub fn glob(pattern: impl Into<String>) -> Self {
        KeyFilter::Glob(pattern.into())
    }
}

impl KeyPredicate for KeyFilter {
    fn test(&self, key: &str) -> bool {
        match self {
            KeyFilter::Any => true,
            KeyFilter::Contains(s) => key.contains(s.as_str()),
            KeyFilter::Prefix(s) => key.starts_with(s.as_str()),
            KeyFilter::Suffix(s) => key.ends_with(s.as_str()),
            KeyFilter::Glob(pattern) => glob_matches(pattern, key),
        }
    }
}

/// Check whether a `/`-separated key matches a glob pattern
pub fn glob_matches(pattern: &str, key: &str) -> bool {
    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let key_parts: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();

    match_parts(&pattern_parts, &key_parts)
}

fn match_parts(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.first(), key.first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        // Key exhausted - only trailing ** can still match
        (Some(_), None) => pattern.iter().all(|&p| p == "**"),
        (Some(&"**"), Some(_)) => {
            (0..=key.len()).any(|skip| match_parts(&pattern[1..], &key[skip..]))
        }
        (Some(&pat), Some(&seg)) => {
            match_segment(pat, seg) && match_parts(&pattern[1..], &key[1..])
        }
    }
}

/// Match one segment, with `*` standing for any run of characters
fn match_segment(pattern: &str, segment: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == segment;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let last = parts.len() - 1;
    let mut pos = 0;

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }

        if i == 0 {
            if !segment.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if i == last {
            return segment.len() >= pos + part.len() && segment.ends_with(part);
        } else {
            match segment[pos..].find(part) {
                Some(found) => pos += found + part.len(),
                None => return false,
            }
        }
    }

    true
}
