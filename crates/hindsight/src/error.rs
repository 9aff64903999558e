//! Error type for the session facade.

use thiserror::Error;

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] hindsight_config::ConfigError),

    #[error(transparent)]
    Cache(#[from] hindsight_cache::CacheError),

    #[error(transparent)]
    Checkpoint(#[from] hindsight_pipeline::CheckpointError),

    #[error(transparent)]
    Pipeline(#[from] hindsight_pipeline::PipelineError),

    #[error("failed to initialise logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}
