//! Shared types for the hindsight pipeline memory system.
//!
//! These types cross crate boundaries: the knowledge store persists them,
//! the context loader packages them into a [`ContextBundle`], and the
//! learning extractor derives them from a finished session.

pub mod bundle;
pub mod domain;
pub mod gate;
pub mod knowledge;

use chrono::{DateTime, Utc};

pub use bundle::ContextBundle;
pub use domain::Domain;
pub use gate::GateResult;
pub use knowledge::{
    Decision, EnforcementLevel, Event, Outcome, Standard, StandardExample, TaskHistoryEntry,
    event_kinds,
};

/// Timestamp type used across all records.
pub type Timestamp = DateTime<Utc>;

/// Current wall-clock time.
pub fn now() -> Timestamp {
    Utc::now()
}
