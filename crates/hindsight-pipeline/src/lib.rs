//! Pipeline-side machinery for hindsight sessions.
//!
//! ```text
//! ContextLoader ──► context_query:bundle
//!        │
//! PipelineDriver ──► phase ─► "{phase}:completed" ─► RecoveryManager::checkpoint
//!        │                       (skipped on resume)
//! LearningExtractor ──► KnowledgeBackend (best-effort, PersistPolicy-gated)
//! ```
//!
//! - [`RecoveryManager`]: checkpoint, resume, cleanup and evidence retention.
//! - [`PipelineDriver`]: runs [`Phase`]s in order, skipping completed ones.
//! - [`ContextLoader`]: packages learned knowledge for a new session.
//! - [`LearningExtractor`]: promotes session findings into the store.

pub mod context;
pub mod driver;
pub mod error;
pub mod learning;
pub mod policy;
pub mod recovery;
pub mod state;

pub use context::{ContextLoader, ContextQueryPhase};
pub use driver::{Phase, PhaseContext, PhaseOutcome, PipelineDriver};
pub use error::{CheckpointError, PipelineError, Result};
pub use learning::{LearningExtractor, Learnings, PersistReport};
pub use policy::{AlwaysPersist, NeverPersist, PersistPolicy, policy_for};
pub use recovery::RecoveryManager;
pub use state::{PhaseRecord, ResumePlan, RunReport, RunStatus, SessionState};

// Re-exported so phase implementations need not depend on tokio-util directly.
pub use tokio_util::sync::CancellationToken;
