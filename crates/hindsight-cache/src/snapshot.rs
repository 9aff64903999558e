//! Serializable image of a [`SessionCache`].

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use hindsight_types::{Domain, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheInner, SessionCache};
use crate::entry::CacheEntry;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 2;

/// Full state of a session cache, including expired-but-unswept entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub session_id: String,
    pub domain: Domain,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub default_ttl: Duration,
    pub entries: BTreeMap<String, CacheEntry>,
}

impl SessionCache {
    /// Capture the cache state.
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock();
        SessionSnapshot {
            version: SNAPSHOT_VERSION,
            session_id: self.session_id.clone(),
            domain: self.domain.clone(),
            created_at: self.created_at,
            updated_at: inner.updated_at,
            default_ttl: self.default_ttl,
            entries: inner
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Rebuild a cache from a snapshot. The version is not checked here.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let default_ttl = snapshot.default_ttl;
        let entries: HashMap<String, CacheEntry> = snapshot.entries.into_iter().collect();
        Self {
            session_id: snapshot.session_id,
            domain: snapshot.domain,
            created_at: snapshot.created_at,
            default_ttl,
            inner: Mutex::new(CacheInner {
                entries,
                updated_at: snapshot.updated_at,
            }),
        }
    }
}
