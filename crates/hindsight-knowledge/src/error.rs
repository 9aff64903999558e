//! Error types for the knowledge store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by knowledge store reads and writes.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Database connection or operation failed (including lock contention
    /// that outlived the busy timeout).
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A JSON column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure preparing the database location.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored row could not be mapped back to a record.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for knowledge store operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
