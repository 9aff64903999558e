//! Cache entries and the options used to write them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque entry payload.
///
/// Stored as bytes; the cache never interprets it. Typed access goes through
/// JSON in [`SessionCache::set`](crate::SessionCache::set) and
/// [`SessionCache::get`](crate::SessionCache::get). Serialized as a string
/// when the bytes are UTF-8 so checkpoints stay readable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(&self.0) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => serializer.serialize_bytes(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Bytes(Vec<u8>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(text) => Self(text.into_bytes()),
            Repr::Bytes(bytes) => Self(bytes),
        })
    }
}

/// Effectiveness metadata attached to an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryMetadata {
    /// How long the producing phase spent computing the value.
    pub computation_time_ms: u64,
    /// Agent or component that produced the value.
    pub source_agent: Option<String>,
    /// Number of successful reads since the entry was written.
    pub hit_count: u64,
}

impl EntryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_computation_time(mut self, elapsed: Duration) -> Self {
        self.computation_time_ms = duration_to_millis(elapsed);
        self
    }

    pub fn with_source_agent(mut self, agent: impl Into<String>) -> Self {
        self.source_agent = Some(agent.into());
        self
    }

    pub fn with_hit_count(mut self, hits: u64) -> Self {
        self.hit_count = hits;
        self
    }
}

/// TTL choice made by the writer of an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryTtl {
    /// Use the cache's default TTL.
    #[default]
    Default,
    /// Never expires; lives as long as the session.
    Session,
    /// Expires once this much time has passed since the write.
    After(Duration),
}

/// Options for a cache write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub ttl: EntryTtl,
    /// Writer-supplied metadata. Replaces the previous entry's metadata on
    /// overwrite; when absent the previous metadata is carried over.
    pub metadata: Option<EntryMetadata>,
    /// Zero the hit count regardless of which metadata wins.
    pub reset_hits: bool,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry exempt from expiry.
    pub fn session() -> Self {
        Self::new().with_ttl(EntryTtl::Session)
    }

    pub fn with_ttl(mut self, ttl: EntryTtl) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn expires_after(self, ttl: Duration) -> Self {
        self.with_ttl(EntryTtl::After(ttl))
    }

    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn reset_hits(mut self) -> Self {
        self.reset_hits = true;
        self
    }
}

/// One cached value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: Payload,
    /// Rust type name recorded by the typed API, for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by_phase: String,
    /// Resolved TTL. `None` means the entry lives for the session.
    /// Stored as `{secs, nanos}` so checkpoints keep full precision.
    pub ttl: Option<Duration>,
    #[serde(default)]
    pub metadata: EntryMetadata,
}

impl CacheEntry {
    /// Whether the entry's TTL has elapsed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.ttl {
            None => false,
            Some(ttl) => now
                .signed_duration_since(self.created_at)
                .to_std()
                .map(|age| age > ttl)
                .unwrap_or(false),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Age of the entry at `now`; zero if the clock went backwards.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

pub(crate) fn duration_to_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
