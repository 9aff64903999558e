//! Hindsight: memory for multi-phase agent pipelines.
//!
//! Two tiers:
//! - a session-scoped [`SessionCache`] holding phase outputs for one run,
//!   checkpointed after every phase so a failed run resumes where it stopped;
//! - a persistent [`KnowledgeStore`] of decisions, standards, task history
//!   and events that every later run consults.
//!
//! [`Hindsight`] wires them together: `begin` loads learned context into a
//! fresh cache, `run` drives the registered phases, `finish` promotes
//! findings into the store and disposes of the checkpoint.

pub mod error;
pub mod logging;
pub mod session;

pub use error::{Error, Result};
pub use session::{FinishReport, Hindsight};

pub use hindsight_cache::{
    CacheEntry, CacheInvalidator, CacheKey, CacheStats, EntryMetadata, EntryTtl, PhaseOrder,
    SessionCache, SetOptions,
};
pub use hindsight_config::{HindsightConfig, LoadedConfig, load_config};
pub use hindsight_knowledge::{KnowledgeBackend, KnowledgeStore, PersistenceError};
pub use hindsight_pipeline::{
    AlwaysPersist, CancellationToken, ContextLoader, LearningExtractor, NeverPersist,
    PersistPolicy, PersistReport, Phase, PhaseContext, PhaseOutcome, PipelineDriver,
    PipelineError, RecoveryManager, ResumePlan, RunReport, RunStatus, SessionState,
};
pub use hindsight_types::{
    ContextBundle, Decision, Domain, EnforcementLevel, Event, GateResult, Outcome, Standard,
    StandardExample, TaskHistoryEntry,
};
