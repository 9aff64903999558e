//! Context bundle delivered to pipeline phases at session start.

use serde::{Deserialize, Serialize};

use crate::{Decision, Standard, TaskHistoryEntry};

/// Learned knowledge relevant to the current request.
///
/// Written once into the session cache under `context_query:bundle` before
/// any phase runs. Phases read it but never write it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub relevant_files: Vec<String>,
    pub past_decisions: Vec<Decision>,
    pub related_standards: Vec<Standard>,
    pub similar_tasks: Vec<TaskHistoryEntry>,
}

impl ContextBundle {
    /// A bundle with every collection empty (cold-start project).
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when no knowledge was found.
    pub fn is_empty(&self) -> bool {
        self.relevant_files.is_empty()
            && self.past_decisions.is_empty()
            && self.related_standards.is_empty()
            && self.similar_tasks.is_empty()
    }
}
