//! Knowledge backend trait for pluggable storage.
//!
//! The context loader and learning extractor depend on this trait rather
//! than on [`KnowledgeStore`] directly, so hosts can substitute another
//! store and tests can inject failures.

use hindsight_types::{Decision, Domain, Event, Standard, TaskHistoryEntry};

use crate::error::Result;
use crate::store::{KnowledgeStore, UpsertOutcome};

/// Operations the pipeline needs from a persistent knowledge store.
///
/// Implementations must be `Send + Sync`; one store is shared by every
/// pipeline run of a project.
pub trait KnowledgeBackend: Send + Sync {
    /// Append a decision.
    fn insert_decision(&self, decision: &Decision) -> Result<()>;

    /// Append a task history entry.
    fn insert_task_history(&self, entry: &TaskHistoryEntry) -> Result<()>;

    /// Append an audit event.
    fn insert_event(&self, event: &Event) -> Result<()>;

    /// Store a standard unless `(domain, rule)` already exists.
    ///
    /// Must be atomic with respect to concurrent callers.
    fn upsert_standard(&self, standard: &Standard) -> Result<UpsertOutcome>;

    /// Every standard recorded for `domain`.
    fn query_standards(&self, domain: &Domain) -> Result<Vec<Standard>>;

    /// The `limit` most recent decisions for `domain`.
    fn query_decisions(&self, domain: &Domain, limit: usize) -> Result<Vec<Decision>>;

    /// Past tasks whose description matches any of `keywords`.
    fn query_similar_tasks(
        &self,
        domain: &Domain,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<TaskHistoryEntry>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// KnowledgeBackend Trait Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl KnowledgeBackend for KnowledgeStore {
    fn insert_decision(&self, decision: &Decision) -> Result<()> {
        KnowledgeStore::insert_decision(self, decision).map(|_| ())
    }

    fn insert_task_history(&self, entry: &TaskHistoryEntry) -> Result<()> {
        KnowledgeStore::insert_task_history(self, entry).map(|_| ())
    }

    fn insert_event(&self, event: &Event) -> Result<()> {
        KnowledgeStore::insert_event(self, event).map(|_| ())
    }

    fn upsert_standard(&self, standard: &Standard) -> Result<UpsertOutcome> {
        KnowledgeStore::upsert_standard(self, standard)
    }

    fn query_standards(&self, domain: &Domain) -> Result<Vec<Standard>> {
        KnowledgeStore::query_standards(self, domain)
    }

    fn query_decisions(&self, domain: &Domain, limit: usize) -> Result<Vec<Decision>> {
        KnowledgeStore::query_decisions(self, domain, limit)
    }

    fn query_similar_tasks(
        &self,
        domain: &Domain,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<TaskHistoryEntry>> {
        KnowledgeStore::query_similar_tasks(self, domain, keywords, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_store_usable_as_trait_object() {
        let backend: Arc<dyn KnowledgeBackend> = Arc::new(KnowledgeStore::open_in_memory().unwrap());
        backend
            .insert_decision(&Decision::new(Domain::Web, "Use React", "team familiarity"))
            .unwrap();
        backend
            .upsert_standard(&Standard::new(Domain::Web, "style", "no_inline_styles", "r"))
            .unwrap();

        assert_eq!(backend.query_decisions(&Domain::Web, 10).unwrap().len(), 1);
        assert_eq!(backend.query_standards(&Domain::Web).unwrap().len(), 1);
    }
}
