//! Configuration system for hindsight.
//!
//! Provides TOML-based configuration with:
//! - `[cache]` defaults for the session-scoped cache
//! - `[recovery]` checkpoint and evidence locations
//! - `[knowledge]` persistent store location and query limits
//! - `[pipeline]` phase order and required quality gates
//! - `[learning]` persistence policy
//! - `[logging]` subscriber filter and JSON log directory
//!
//! Files are layered: the user config directory first, then a
//! project-local `hindsight.toml` which overrides it section by section.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options, save_config,
    user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
