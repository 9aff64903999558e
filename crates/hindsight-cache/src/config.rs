//! Configuration for the session cache.

use std::time::Duration;

/// Default TTL for entries written with [`EntryTtl::Default`](crate::EntryTtl::Default).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Configuration for a [`SessionCache`](crate::SessionCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL applied to entries that do not choose their own.
    pub default_ttl: Duration,

    /// Interval for the background sweep of expired entries.
    /// `None` means expired entries are only dropped on access.
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            sweep_interval: None,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default entry TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Enable the background sweeper at the given interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Disable the background sweeper.
    pub fn without_sweeper(mut self) -> Self {
        self.sweep_interval = None;
        self
    }
}
