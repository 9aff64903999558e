//! Optional background sweep of expired entries.
//!
//! Expiry is enforced on read, so the sweeper only reclaims memory held by
//! entries nobody reads again.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::SessionCache;

/// Spawn a task that calls [`SessionCache::sweep_expired`] every `interval`.
///
/// The task holds only a weak reference and exits once the cache is dropped.
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper(cache: &Arc<SessionCache>, interval: Duration) -> JoinHandle<()> {
    let weak: Weak<SessionCache> = Arc::downgrade(cache);
    info!(
        session_id = %cache.session_id(),
        interval_ms = interval.as_millis() as u64,
        "Starting cache sweeper"
    );

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let Some(cache) = weak.upgrade() else {
                debug!("Cache dropped, sweeper exiting");
                break;
            };
            cache.sweep_expired();
        }
    })
}
