//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [cache]        # session cache defaults
//! [recovery]     # checkpoint / evidence directories and timeouts
//! [knowledge]    # persistent knowledge store
//! [pipeline]     # phase order and required gates
//! [learning]     # persistence policy for learned standards
//! [logging]      # tracing subscriber settings
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Directory (relative to the project root) holding all hindsight state.
pub const STATE_DIR: &str = ".hindsight";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HindsightConfig {
    pub cache: Option<CacheSection>,
    pub recovery: Option<RecoverySection>,
    pub knowledge: Option<KnowledgeSection>,
    pub pipeline: Option<PipelineSection>,
    pub learning: Option<LearningSection>,
    pub logging: Option<LoggingConfig>,
}

impl HindsightConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: HindsightConfig) {
        if other.cache.is_some() {
            self.cache = other.cache;
        }
        if other.recovery.is_some() {
            self.recovery = other.recovery;
        }
        if other.knowledge.is_some() {
            self.knowledge = other.knowledge;
        }
        if other.pipeline.is_some() {
            self.pipeline = other.pipeline;
        }
        if other.learning.is_some() {
            self.learning = other.learning;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    pub fn cache(&self) -> CacheSection {
        self.cache.clone().unwrap_or_default()
    }

    pub fn recovery(&self) -> RecoverySection {
        self.recovery.clone().unwrap_or_default()
    }

    pub fn knowledge(&self) -> KnowledgeSection {
        self.knowledge.clone().unwrap_or_default()
    }

    pub fn pipeline(&self) -> PipelineSection {
        self.pipeline.clone().unwrap_or_default()
    }

    pub fn learning(&self) -> LearningSection {
        self.learning.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Check value ranges across all sections.
    pub fn validate(&self) -> Result<()> {
        let cache = self.cache();
        if cache.default_ttl_secs == 0 {
            return Err(invalid("cache.default_ttl_secs", "must be greater than 0"));
        }
        if cache.sweep_interval_secs == Some(0) {
            return Err(invalid("cache.sweep_interval_secs", "must be greater than 0"));
        }

        let knowledge = self.knowledge();
        if knowledge.decision_limit == 0 {
            return Err(invalid("knowledge.decision_limit", "must be greater than 0"));
        }
        if knowledge.similar_task_limit == 0 {
            return Err(invalid(
                "knowledge.similar_task_limit",
                "must be greater than 0",
            ));
        }

        let pipeline = self.pipeline();
        if pipeline.phases.is_empty() {
            return Err(invalid("pipeline.phases", "at least one phase is required"));
        }
        for (i, phase) in pipeline.phases.iter().enumerate() {
            if phase.trim().is_empty() || phase.contains(':') {
                return Err(invalid(
                    "pipeline.phases",
                    &format!("'{}' is not a valid phase name", phase),
                ));
            }
            if pipeline.phases[..i].contains(phase) {
                return Err(invalid(
                    "pipeline.phases",
                    &format!("phase '{}' is listed twice", phase),
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Resolve a configured path against the project root.
///
/// Absolute paths are returned unchanged; relative paths are joined to `root`.
pub fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session cache configuration.
///
/// ```toml
/// [cache]
/// default_ttl_secs = 3600
/// sweep_interval_secs = 300
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// TTL applied to entries that do not choose their own.
    pub default_ttl_secs: u64,
    /// Interval of the optional background sweep of expired entries.
    /// `None` disables the sweeper; expiry is still enforced on read.
    pub sweep_interval_secs: Option<u64>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            default_ttl_secs: 3600,
            sweep_interval_secs: None,
        }
    }
}

impl CacheSection {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Recovery Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Checkpoint and evidence configuration.
///
/// ```toml
/// [recovery]
/// checkpoint_dir = ".hindsight/checkpoints"
/// evidence_dir = ".hindsight/evidence"
/// retry_backoff_ms = 250
/// cancel_timeout_ms = 2000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySection {
    /// Directory for resumable checkpoints. Relative to the project root.
    pub checkpoint_dir: PathBuf,
    /// Directory for checkpoints retained after terminal failure.
    pub evidence_dir: PathBuf,
    /// Backoff before the single retry of a failed checkpoint write.
    pub retry_backoff_ms: u64,
    /// Upper bound on the best-effort checkpoint taken during cancellation.
    pub cancel_timeout_ms: u64,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from(STATE_DIR).join("checkpoints"),
            evidence_dir: PathBuf::from(STATE_DIR).join("evidence"),
            retry_backoff_ms: 250,
            cancel_timeout_ms: 2000,
        }
    }
}

impl RecoverySection {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge Store Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Persistent knowledge store configuration.
///
/// ```toml
/// [knowledge]
/// database = ".hindsight/knowledge.db"
/// busy_timeout_ms = 5000
/// decision_limit = 10
/// similar_task_limit = 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeSection {
    /// SQLite database path. Relative to the project root.
    pub database: PathBuf,
    /// How long a write waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Number of most recent decisions loaded into a context bundle.
    pub decision_limit: usize,
    /// Number of similar past tasks loaded into a context bundle.
    pub similar_task_limit: usize,
}

impl Default for KnowledgeSection {
    fn default() -> Self {
        Self {
            database: PathBuf::from(STATE_DIR).join("knowledge.db"),
            busy_timeout_ms: 5000,
            decision_limit: 10,
            similar_task_limit: 5,
        }
    }
}

impl KnowledgeSection {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Declared phase order and gate requirements.
///
/// ```toml
/// [pipeline]
/// phases = ["context_query", "analysis", "planning", "implementation", "quality"]
/// required_gates = ["standards_gate", "test_gate"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Phases in execution order. Later phases are downstream of earlier ones.
    pub phases: Vec<String>,
    /// Gates that must pass for a run to count as a success.
    pub required_gates: Vec<String>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            phases: [
                "context_query",
                "analysis",
                "planning",
                "implementation",
                "quality",
                "learning",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            required_gates: vec!["standards_gate".to_string(), "test_gate".to_string()],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Learning Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Whether newly derived standards are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    #[default]
    Always,
    Never,
}

/// Learning extraction configuration.
///
/// ```toml
/// [learning]
/// persist = "always"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningSection {
    pub persist: PersistMode,
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
///
/// ```toml
/// [logging]
/// filter = "hindsight=debug,info"
/// json_dir = ".hindsight/logs"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive for the console layer.
    pub filter: String,
    /// Directory for daily-rotated JSON logs. Disabled when unset.
    pub json_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "hindsight=info,hindsight_cache=info,hindsight_knowledge=info,hindsight_pipeline=info,warn".to_string(),
            json_dir: None,
        }
    }
}
