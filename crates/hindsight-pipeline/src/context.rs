//! Loading learned knowledge into a fresh session.

use std::sync::Arc;

use async_trait::async_trait;
use hindsight_cache::{CONTEXT_QUERY_PHASE, CacheKey, SessionCache, SetOptions};
use hindsight_config::KnowledgeSection;
use hindsight_knowledge::{KnowledgeBackend, extract_keywords};
use hindsight_types::{ContextBundle, Domain};
use tracing::{debug, info, warn};

use crate::driver::{Phase, PhaseContext, PhaseOutcome};
use crate::error::Result;

/// Queries the knowledge store for everything relevant to a request.
///
/// Never fails: an empty or unreachable store yields an empty bundle, which
/// is the normal state of a project with nothing learned yet.
#[derive(Clone)]
pub struct ContextLoader {
    store: Option<Arc<dyn KnowledgeBackend>>,
    decision_limit: usize,
    similar_task_limit: usize,
}

impl std::fmt::Debug for ContextLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLoader")
            .field("attached", &self.store.is_some())
            .field("decision_limit", &self.decision_limit)
            .field("similar_task_limit", &self.similar_task_limit)
            .finish()
    }
}

impl ContextLoader {
    pub fn new(
        store: Arc<dyn KnowledgeBackend>,
        decision_limit: usize,
        similar_task_limit: usize,
    ) -> Self {
        Self {
            store: Some(store),
            decision_limit,
            similar_task_limit,
        }
    }

    pub fn from_config(store: Arc<dyn KnowledgeBackend>, section: &KnowledgeSection) -> Self {
        Self::new(store, section.decision_limit, section.similar_task_limit)
    }

    /// A loader with no store behind it; every load returns an empty bundle.
    pub fn detached() -> Self {
        let defaults = KnowledgeSection::default();
        Self {
            store: None,
            decision_limit: defaults.decision_limit,
            similar_task_limit: defaults.similar_task_limit,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.store.is_some()
    }

    /// Build the bundle for `request` in `domain`.
    ///
    /// Standards: all for the domain. Decisions: the most recent
    /// `decision_limit`. Similar tasks: keyword matches on the request.
    /// A failed query leaves its field empty and logs a warning.
    pub fn load(&self, domain: &Domain, request: &str) -> ContextBundle {
        let Some(store) = &self.store else {
            debug!(%domain, "No knowledge store attached, using empty context");
            return ContextBundle::empty();
        };

        let related_standards = store.query_standards(domain).unwrap_or_else(|e| {
            warn!(%domain, error = %e, "Failed to load standards");
            Vec::new()
        });

        let past_decisions = store
            .query_decisions(domain, self.decision_limit)
            .unwrap_or_else(|e| {
                warn!(%domain, error = %e, "Failed to load decisions");
                Vec::new()
            });

        let keywords = extract_keywords(request);
        let similar_tasks = if keywords.is_empty() {
            Vec::new()
        } else {
            store
                .query_similar_tasks(domain, &keywords, self.similar_task_limit)
                .unwrap_or_else(|e| {
                    warn!(%domain, error = %e, "Failed to load similar tasks");
                    Vec::new()
                })
        };

        let mut relevant_files: Vec<String> = Vec::new();
        for file in similar_tasks.iter().flat_map(|t| &t.files_modified) {
            if !relevant_files.contains(file) {
                relevant_files.push(file.clone());
            }
        }

        let bundle = ContextBundle {
            relevant_files,
            past_decisions,
            related_standards,
            similar_tasks,
        };
        info!(
            %domain,
            standards = bundle.related_standards.len(),
            decisions = bundle.past_decisions.len(),
            similar_tasks = bundle.similar_tasks.len(),
            "Context loaded"
        );
        bundle
    }

    /// Load the bundle for the cache's domain and write it under
    /// `context_query:bundle` for the lifetime of the session.
    pub fn load_into(&self, cache: &SessionCache, request: &str) -> Result<ContextBundle> {
        let bundle = self.load(cache.domain(), request);
        cache.set(
            CacheKey::context_bundle(),
            &bundle,
            CONTEXT_QUERY_PHASE,
            SetOptions::session(),
        )?;
        Ok(bundle)
    }

    /// The bundle previously written into `cache`, if any.
    pub fn cached_bundle(cache: &SessionCache) -> Result<Option<ContextBundle>> {
        Ok(cache.get(CacheKey::context_bundle())?)
    }
}

/// The `context_query` phase: runs the loader as the first pipeline step.
#[derive(Debug, Clone)]
pub struct ContextQueryPhase {
    loader: ContextLoader,
}

impl ContextQueryPhase {
    pub fn new(loader: ContextLoader) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl Phase for ContextQueryPhase {
    fn name(&self) -> &str {
        CONTEXT_QUERY_PHASE
    }

    async fn execute(&self, cache: &SessionCache, ctx: &PhaseContext) -> Result<PhaseOutcome> {
        self.loader.load_into(cache, &ctx.request)?;
        Ok(PhaseOutcome::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hindsight_cache::CacheConfig;
    use hindsight_knowledge::KnowledgeStore;
    use hindsight_types::{Decision, Outcome, Standard, TaskHistoryEntry};

    fn store() -> Arc<KnowledgeStore> {
        Arc::new(KnowledgeStore::open_in_memory().unwrap())
    }

    #[test]
    fn test_empty_store_gives_empty_bundle() {
        let loader = ContextLoader::new(store(), 10, 5);
        let bundle = loader.load(&Domain::Web, "add a button");
        assert!(bundle.is_empty());
        assert_eq!(bundle, ContextBundle::empty());
    }

    #[test]
    fn test_detached_loader_gives_empty_bundle() {
        let loader = ContextLoader::detached();
        assert!(!loader.is_attached());
        assert!(loader.load(&Domain::Web, "add a button").is_empty());
    }

    #[test]
    fn test_bundle_contents_and_relevant_files() {
        let store = store();
        store
            .upsert_standard(&Standard::new(Domain::Web, "styling", "no_inline_styles", "why"))
            .unwrap();
        store
            .upsert_standard(&Standard::new(Domain::Mobile, "perf", "memo_lists", "why"))
            .unwrap();
        store
            .insert_decision(&Decision::new(Domain::Web, "Use Tailwind", "consistency"))
            .unwrap();
        store
            .insert_task_history(
                &TaskHistoryEntry::new(Domain::Web, "Add login button", Outcome::Success)
                    .with_files(vec!["src/Login.tsx".into(), "src/Button.tsx".into()]),
            )
            .unwrap();
        store
            .insert_task_history(
                &TaskHistoryEntry::new(Domain::Web, "Restyle button hover", Outcome::Failure)
                    .with_files(vec!["src/Button.tsx".into(), "src/theme.css".into()]),
            )
            .unwrap();

        let loader = ContextLoader::new(store, 10, 5);
        let bundle = loader.load(&Domain::Web, "add a button");

        assert_eq!(bundle.related_standards.len(), 1);
        assert_eq!(bundle.related_standards[0].rule, "no_inline_styles");
        assert_eq!(bundle.past_decisions.len(), 1);
        assert_eq!(bundle.similar_tasks.len(), 2);
        let mut files = bundle.relevant_files.clone();
        files.sort();
        assert_eq!(files, vec!["src/Button.tsx", "src/Login.tsx", "src/theme.css"]);
    }

    #[test]
    fn test_load_into_writes_session_entry() {
        let cache = SessionCache::new(Domain::Web, &CacheConfig::default());
        let loader = ContextLoader::new(store(), 10, 5);

        let bundle = loader.load_into(&cache, "add a button").unwrap();
        let entry = cache.peek_entry("context_query:bundle").unwrap();
        assert_eq!(entry.created_by_phase, "context_query");
        assert!(entry.ttl.is_none());
        assert_eq!(ContextLoader::cached_bundle(&cache).unwrap(), Some(bundle));
    }
}
