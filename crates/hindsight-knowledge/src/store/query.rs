//! Result types for knowledge store operations.

use serde::Serialize;

/// Row id of a stored standard.
pub type StandardId = i64;

/// Result of an upsert-by-rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No standard existed for `(domain, rule)`; this one was stored.
    Inserted(StandardId),
    /// A standard already existed and was left untouched.
    Existing(StandardId),
}

impl UpsertOutcome {
    pub fn id(&self) -> StandardId {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Existing(id) => *id,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted(_))
    }
}

/// Store-wide counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnowledgeStats {
    pub decision_count: usize,
    pub standard_count: usize,
    pub task_count: usize,
    pub event_count: usize,
    pub schema_version: i32,
}
