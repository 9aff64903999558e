//! Typed cache keys.
//!
//! Keys follow the `"{phase}:{kind}[:{id}]"` convention, e.g.
//! `"analysis:dependency_map"` or `"implementation:patch:src/lib.rs"`.
//! All construction goes through [`CacheKey`] so the format is checked
//! in one place.

use std::fmt;
use std::str::FromStr;

use crate::error::{CacheError, Result};

const SEPARATOR: char = ':';

/// Kind used for phase completion markers.
pub const COMPLETED_KIND: &str = "completed";

/// Phase owning the context bundle written at session start.
pub const CONTEXT_QUERY_PHASE: &str = "context_query";

/// Kind of the context bundle entry.
pub const BUNDLE_KIND: &str = "bundle";

/// A validated cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    full: String,
    phase_len: usize,
    kind_end: usize,
}

impl CacheKey {
    /// Build a `"{phase}:{kind}"` key.
    pub fn new(phase: &str, kind: &str) -> Result<Self> {
        Self::parse(&format!("{phase}{SEPARATOR}{kind}"))
    }

    /// Append an identifier segment, producing `"{phase}:{kind}:{id}"`.
    pub fn with_id(self, id: &str) -> Result<Self> {
        if self.id().is_some() {
            return Err(CacheError::invalid_key(
                format!("{}{SEPARATOR}{id}", self.full),
                "key already has an id segment",
            ));
        }
        Self::parse(&format!("{}{SEPARATOR}{id}", self.full))
    }

    /// Parse and validate a raw key string.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(CacheError::invalid_key(raw, "key is empty"));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(CacheError::invalid_key(raw, "key contains whitespace"));
        }

        let segments: Vec<&str> = raw.split(SEPARATOR).collect();
        if segments.len() < 2 {
            return Err(CacheError::invalid_key(
                raw,
                "expected at least '{phase}:{kind}'",
            ));
        }
        if segments.len() > 3 {
            return Err(CacheError::invalid_key(
                raw,
                "expected at most '{phase}:{kind}:{id}'",
            ));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(CacheError::invalid_key(raw, "key has an empty segment"));
        }

        let phase_len = segments[0].len();
        Ok(Self {
            full: raw.to_string(),
            phase_len,
            kind_end: phase_len + 1 + segments[1].len(),
        })
    }

    /// Completion marker for a phase: `"{phase}:completed"`.
    pub fn completed(phase: &str) -> Result<Self> {
        Self::new(phase, COMPLETED_KIND)
    }

    /// Key under which the context bundle is delivered: `"context_query:bundle"`.
    pub fn context_bundle() -> Self {
        let phase_len = CONTEXT_QUERY_PHASE.len();
        Self {
            full: format!("{CONTEXT_QUERY_PHASE}{SEPARATOR}{BUNDLE_KIND}"),
            phase_len,
            kind_end: phase_len + 1 + BUNDLE_KIND.len(),
        }
    }

    pub fn phase(&self) -> &str {
        &self.full[..self.phase_len]
    }

    pub fn kind(&self) -> &str {
        &self.full[self.phase_len + 1..self.kind_end]
    }

    pub fn id(&self) -> Option<&str> {
        if self.kind_end < self.full.len() {
            Some(&self.full[self.kind_end + 1..])
        } else {
            None
        }
    }

    /// Whether this key is a phase completion marker.
    pub fn is_completion_marker(&self) -> bool {
        self.id().is_none() && self.kind() == COMPLETED_KIND
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }

    pub fn into_string(self) -> String {
        self.full
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.full
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl FromStr for CacheKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for CacheKey {
    type Error = CacheError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

/// Validate a phase tag passed alongside a key.
pub(crate) fn validate_phase(key: &str, phase: &str) -> Result<()> {
    if phase.is_empty() {
        return Err(CacheError::invalid_key(key, "phase tag is empty"));
    }
    if phase.contains(SEPARATOR) || phase.chars().any(char::is_whitespace) {
        return Err(CacheError::invalid_key(
            key,
            format!("phase tag '{phase}' is malformed"),
        ));
    }
    Ok(())
}
