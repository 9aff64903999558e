//! Session-scoped pipeline cache.
//!
//! One [`SessionCache`] belongs to one pipeline run. Phases write their
//! outputs under typed [`CacheKey`]s tagged with the phase that produced
//! them; later phases read them back instead of recomputing. Entries may
//! carry a TTL (checked lazily on read) and hit-count metadata used for
//! effectiveness reporting.
//!
//! # Example
//!
//! ```rust,ignore
//! use hindsight_cache::{CacheConfig, CacheKey, SessionCache, SetOptions};
//!
//! let cache = SessionCache::new(Domain::Web, &CacheConfig::default());
//! let key = CacheKey::new("analysis", "dependency_map")?;
//! cache.set(&key, &deps, "analysis", SetOptions::session())?;
//! let deps: Option<DependencyMap> = cache.get(&key)?;
//! ```

mod cache;
mod config;
mod entry;
mod error;
mod invalidation;
mod key;
mod snapshot;
mod sweep;

pub use cache::{CacheStats, SessionCache, metadata_for, new_session_id};
pub use config::{CacheConfig, DEFAULT_TTL};
pub use entry::{CacheEntry, EntryMetadata, EntryTtl, Payload, SetOptions};
pub use error::{CacheError, Result};
pub use invalidation::{CacheInvalidator, InvalidationReport, PhaseOrder};
pub use key::{BUNDLE_KIND, COMPLETED_KIND, CONTEXT_QUERY_PHASE, CacheKey};
pub use snapshot::{SNAPSHOT_VERSION, SessionSnapshot};
pub use sweep::spawn_sweeper;
