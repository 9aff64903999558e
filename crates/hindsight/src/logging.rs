//! Tracing setup: human-readable console output plus optional rotating JSON.

use hindsight_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::error::Result;

const JSON_FILTER: &str = "hindsight=trace,hindsight_cache=trace,hindsight_knowledge=trace,hindsight_pipeline=trace,hindsight_config=trace,info";

/// Install the global subscriber.
///
/// When `json_dir` is set, a daily-rotated `hindsight.log` JSON file is
/// written there; keep the returned guard alive to flush it. Fails if a
/// global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let console_filter = EnvFilter::try_new(&config.filter)
        .unwrap_or_else(|_| EnvFilter::new(LoggingConfig::default().filter));

    let (json_layer, guard) = match &config.json_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "hindsight.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new(JSON_FILTER));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(console_filter),
        )
        .with(json_layer)
        .try_init()?;

    Ok(guard)
}
