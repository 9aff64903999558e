//! The session-scoped cache.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use hindsight_types::{Domain, Timestamp};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, EntryMetadata, EntryTtl, Payload, SetOptions};
use crate::error::{CacheError, Result};
use crate::key::{CacheKey, validate_phase};

/// Aggregate effectiveness numbers across live entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_hits: u64,
    /// Sum of `computation_time_ms * hit_count`: work each hit avoided.
    pub total_computation_time_saved_ms: u64,
    pub avg_entry_age_ms: u64,
}

pub(crate) struct CacheInner {
    pub(crate) entries: HashMap<String, CacheEntry>,
    pub(crate) updated_at: Timestamp,
}

/// Ephemeral key/value store owned by a single pipeline run.
///
/// Entries carry the phase that wrote them, an optional TTL, and hit-count
/// metadata. Expiry is checked on read; nothing runs in the background
/// unless [`spawn_sweeper`](crate::spawn_sweeper) is used.
///
/// All methods take `&self`: the entry map sits behind a single mutex so
/// concurrent sub-tasks within a phase may share the cache.
pub struct SessionCache {
    pub(crate) session_id: String,
    pub(crate) domain: Domain,
    pub(crate) created_at: Timestamp,
    pub(crate) default_ttl: Duration,
    pub(crate) inner: Mutex<CacheInner>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("session_id", &self.session_id)
            .field("domain", &self.domain)
            .field("entries", &self.inner.lock().entries.len())
            .finish()
    }
}

impl SessionCache {
    /// Create a cache for a new run with a freshly generated session id.
    pub fn new(domain: Domain, config: &CacheConfig) -> Self {
        Self::with_session_id(new_session_id(), domain, config)
    }

    /// Create an empty cache under a known session id.
    pub fn with_session_id(session_id: impl Into<String>, domain: Domain, config: &CacheConfig) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            domain,
            created_at: now,
            default_ttl: config.default_ttl,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                updated_at: now,
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.inner.lock().updated_at
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Serialize `value` as JSON and store it under `key`.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: impl AsRef<str>,
        value: &T,
        phase: &str,
        opts: SetOptions,
    ) -> Result<()> {
        let key = CacheKey::parse(key.as_ref())?;
        let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            source: e,
        })?;
        self.insert(
            key,
            Payload::from(bytes),
            Some(std::any::type_name::<T>().to_string()),
            phase,
            opts,
        )
    }

    /// Store an opaque payload under `key`.
    pub fn set_raw(
        &self,
        key: impl AsRef<str>,
        value: impl Into<Payload>,
        phase: &str,
        opts: SetOptions,
    ) -> Result<()> {
        let key = CacheKey::parse(key.as_ref())?;
        self.insert(key, value.into(), None, phase, opts)
    }

    fn insert(
        &self,
        key: CacheKey,
        value: Payload,
        type_tag: Option<String>,
        phase: &str,
        opts: SetOptions,
    ) -> Result<()> {
        validate_phase(key.as_str(), phase)?;

        let now = Utc::now();
        let ttl = match opts.ttl {
            EntryTtl::Default => Some(self.default_ttl),
            EntryTtl::Session => None,
            EntryTtl::After(d) => Some(d),
        };

        let mut inner = self.inner.lock();
        let previous = inner
            .entries
            .get(key.as_str())
            .filter(|e| !e.is_expired_at(now))
            .map(|e| e.metadata.clone());
        let overwrote = previous.is_some();

        let mut metadata = opts.metadata.or(previous).unwrap_or_default();
        if opts.reset_hits {
            metadata.hit_count = 0;
        }

        let size = value.len();
        let key = key.into_string();
        let entry = CacheEntry {
            key: key.clone(),
            value,
            type_tag,
            created_at: now,
            created_by_phase: phase.to_string(),
            ttl,
            metadata,
        };
        inner.entries.insert(key.clone(), entry);
        inner.updated_at = now;

        debug!(
            session_id = %self.session_id,
            key = %key,
            phase = %phase,
            size,
            overwrote,
            "Cache write"
        );
        Ok(())
    }

    /// Fetch and decode a JSON value.
    ///
    /// Returns `Ok(None)` on a miss or when the entry has expired.
    pub fn get<T: DeserializeOwned>(&self, key: impl AsRef<str>) -> Result<Option<T>> {
        let key = key.as_ref();
        match self.get_raw(key)? {
            Some(payload) => serde_json::from_slice(payload.as_bytes())
                .map(Some)
                .map_err(|e| CacheError::Serialization {
                    key: key.to_string(),
                    source: e,
                }),
            None => Ok(None),
        }
    }

    /// Fetch the raw payload, counting a hit.
    pub fn get_raw(&self, key: impl AsRef<str>) -> Result<Option<Payload>> {
        let key = CacheKey::parse(key.as_ref())?;
        let now = Utc::now();
        let mut inner = self.inner.lock();

        match inner.entries.get_mut(key.as_str()) {
            None => {
                trace!(session_id = %self.session_id, key = %key, "Cache miss");
                return Ok(None);
            }
            Some(entry) if !entry.is_expired_at(now) => {
                entry.metadata.hit_count += 1;
                debug!(
                    session_id = %self.session_id,
                    key = %key,
                    hits = entry.metadata.hit_count,
                    "Cache hit"
                );
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => {}
        }

        // Lazy expiry: the stale value is dropped, never returned.
        inner.entries.remove(key.as_str());
        debug!(session_id = %self.session_id, key = %key, "Cache entry expired");
        Ok(None)
    }

    /// Copy of a live entry without counting a hit.
    pub fn peek_entry(&self, key: impl AsRef<str>) -> Option<CacheEntry> {
        let now = Utc::now();
        let inner = self.inner.lock();
        inner
            .entries
            .get(key.as_ref())
            .filter(|e| !e.is_expired_at(now))
            .cloned()
    }

    /// Whether a live entry exists under `key`. Does not count a hit.
    pub fn contains(&self, key: impl AsRef<str>) -> bool {
        let now = Utc::now();
        self.inner
            .lock()
            .entries
            .get(key.as_ref())
            .is_some_and(|e| !e.is_expired_at(now))
    }

    /// Remove an entry. Removing an absent key is a no-op.
    pub fn delete(&self, key: impl AsRef<str>) -> bool {
        let key = key.as_ref();
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(key).is_some();
        if removed {
            inner.updated_at = Utc::now();
            debug!(session_id = %self.session_id, key = %key, "Cache entry deleted");
        }
        removed
    }

    /// Remove every entry written by `phase`. Returns the number removed.
    pub fn invalidate_phase(&self, phase: &str) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.created_by_phase != phase);
        let removed = before - inner.entries.len();
        if removed > 0 {
            inner.updated_at = Utc::now();
        }
        debug!(session_id = %self.session_id, phase = %phase, removed, "Phase invalidated");
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.updated_at = Utc::now();
        debug!(session_id = %self.session_id, "Cache cleared");
    }

    /// Drop expired entries. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| !e.is_expired_at(now));
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(session_id = %self.session_id, removed, "Swept expired entries");
        }
        removed
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| !e.is_expired_at(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted keys of live entries.
    pub fn keys(&self) -> Vec<String> {
        let now = Utc::now();
        let mut keys: Vec<String> = self
            .inner
            .lock()
            .entries
            .values()
            .filter(|e| !e.is_expired_at(now))
            .map(|e| e.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Live entries written by `phase`, sorted by key.
    pub fn entries_for_phase(&self, phase: &str) -> Vec<CacheEntry> {
        let mut entries = self.live_entries_where(|e| e.created_by_phase == phase);
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// All live entries, sorted by key.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries = self.live_entries_where(|_| true);
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    fn live_entries_where(&self, pred: impl Fn(&CacheEntry) -> bool) -> Vec<CacheEntry> {
        let now = Utc::now();
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| !e.is_expired_at(now) && pred(e))
            .cloned()
            .collect()
    }

    /// Aggregate metadata across live entries.
    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let inner = self.inner.lock();

        let mut stats = CacheStats::default();
        let mut total_age_ms: u128 = 0;
        for entry in inner.entries.values().filter(|e| !e.is_expired_at(now)) {
            stats.total_entries += 1;
            stats.total_hits += entry.metadata.hit_count;
            stats.total_computation_time_saved_ms = stats
                .total_computation_time_saved_ms
                .saturating_add(entry.metadata.computation_time_ms.saturating_mul(entry.metadata.hit_count));
            total_age_ms += entry.age_at(now).as_millis();
        }
        if stats.total_entries > 0 {
            let avg = total_age_ms / stats.total_entries as u128;
            stats.avg_entry_age_ms = u64::try_from(avg).unwrap_or(u64::MAX);
        }
        stats
    }
}

/// Generate an opaque, file-name safe session id.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Metadata helper for phases timing their own work.
pub fn metadata_for(agent: &str, elapsed: Duration) -> EntryMetadata {
    EntryMetadata::new()
        .with_source_agent(agent)
        .with_computation_time(elapsed)
}
