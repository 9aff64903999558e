//! Error types for recovery and pipeline execution.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::state::SessionState;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while writing or reading checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Filesystem failure (disk full, permissions, missing directory).
    #[error("Checkpoint I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot could not be encoded or decoded.
    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The checkpoint was written by an incompatible format version.
    #[error("Unsupported checkpoint version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// The session id cannot be used as a file name.
    #[error("Invalid session id '{0}'")]
    InvalidSessionId(String),

    /// A bounded checkpoint attempt did not finish in time.
    #[error("Checkpoint timed out after {0:?}")]
    Timeout(Duration),
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that can occur during pipeline execution.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A cache operation failed. `InvalidKey` aborts the calling phase.
    #[error(transparent)]
    Cache(#[from] hindsight_cache::CacheError),

    /// Knowledge store failure.
    #[error(transparent)]
    Persistence(#[from] hindsight_knowledge::PersistenceError),

    /// Checkpoint failure.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// A phase reported failure.
    #[error("Phase '{phase}' failed: {message}")]
    PhaseFailed { phase: String, message: String },

    /// The run was cancelled.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// A session lifecycle transition that the state machine forbids.
    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

impl PipelineError {
    /// Convenience constructor for phase implementations.
    pub fn phase_failed(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PhaseFailed {
            phase: phase.into(),
            message: message.into(),
        }
    }
}
