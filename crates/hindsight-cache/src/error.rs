//! Error types for session cache operations.

/// Error type for session cache operations.
///
/// A cache miss is not an error; lookups return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A malformed key (or phase tag) was passed to the cache. This is a
    /// programming error in the calling phase.
    #[error("Invalid cache key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// A typed value could not be encoded to or decoded from its payload.
    #[error("Payload serialization failed for '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub(crate) fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for session cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
