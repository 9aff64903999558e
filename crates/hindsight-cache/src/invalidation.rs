//! Phase-order aware invalidation.
//!
//! When a phase re-runs, its own previous entries and everything derived
//! from it downstream are stale. [`CacheInvalidator`] applies that policy on
//! top of [`SessionCache::invalidate_phase`].

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::SessionCache;

/// Declared execution order of a pipeline's phases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseOrder {
    phases: Vec<String>,
}

impl PhaseOrder {
    pub fn new<I, S>(phases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            phases: phases.into_iter().map(Into::into).collect(),
        }
    }

    pub fn phases(&self) -> &[String] {
        &self.phases
    }

    pub fn position(&self, phase: &str) -> Option<usize> {
        self.phases.iter().position(|p| p == phase)
    }

    pub fn contains(&self, phase: &str) -> bool {
        self.position(phase).is_some()
    }

    /// `phase` followed by every phase after it, or `None` if unknown.
    pub fn from_phase(&self, phase: &str) -> Option<&[String]> {
        self.position(phase).map(|i| &self.phases[i..])
    }

    /// Phases strictly after `phase`.
    pub fn downstream_of(&self, phase: &str) -> &[String] {
        match self.position(phase) {
            Some(i) => &self.phases[i + 1..],
            None => &[],
        }
    }
}

/// What an invalidation pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    /// Phases whose entries were invalidated, in order.
    pub phases: Vec<String>,
    /// Total entries removed.
    pub removed: usize,
    /// The trigger phase was missing from the phase order.
    pub unknown_phase: bool,
}

/// Applies invalidation policies to a cache.
#[derive(Debug, Clone)]
pub struct CacheInvalidator {
    order: PhaseOrder,
}

impl CacheInvalidator {
    pub fn new(order: PhaseOrder) -> Self {
        Self { order }
    }

    pub fn order(&self) -> &PhaseOrder {
        &self.order
    }

    /// Remove a single entry by key.
    pub fn invalidate_key(&self, cache: &SessionCache, key: &str) -> bool {
        cache.delete(key)
    }

    /// Invalidate entries of `phase` and of every phase downstream of it.
    ///
    /// Called before `phase` re-executes. An unknown phase only has its own
    /// entries removed.
    pub fn on_phase_rerun(&self, cache: &SessionCache, phase: &str) -> InvalidationReport {
        let Some(affected) = self.order.from_phase(phase) else {
            warn!(
                session_id = %cache.session_id(),
                phase = %phase,
                "Phase missing from phase order, invalidating only its own entries"
            );
            return InvalidationReport {
                phases: vec![phase.to_string()],
                removed: cache.invalidate_phase(phase),
                unknown_phase: true,
            };
        };

        let removed = affected.iter().map(|p| cache.invalidate_phase(p)).sum();
        debug!(
            session_id = %cache.session_id(),
            phase = %phase,
            cascaded = affected.len() - 1,
            removed,
            "Invalidated phase and downstream entries"
        );
        InvalidationReport {
            phases: affected.to_vec(),
            removed,
            unknown_phase: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheConfig, SetOptions};
    use hindsight_types::Domain;

    fn populated() -> SessionCache {
        let cache = SessionCache::new(Domain::Web, &CacheConfig::default());
        for (key, phase) in [
            ("context_query:bundle", "context_query"),
            ("analysis:results", "analysis"),
            ("planning:plan", "planning"),
            ("implementation:patch", "implementation"),
            ("quality:report", "quality"),
        ] {
            cache.set_raw(key, "{}", phase, SetOptions::session()).unwrap();
        }
        cache
    }

    fn invalidator() -> CacheInvalidator {
        CacheInvalidator::new(PhaseOrder::new([
            "context_query",
            "analysis",
            "planning",
            "implementation",
            "quality",
        ]))
    }

    #[test]
    fn test_rerun_cascades_downstream() {
        let cache = populated();
        let report = invalidator().on_phase_rerun(&cache, "planning");

        assert_eq!(report.phases, vec!["planning", "implementation", "quality"]);
        assert_eq!(report.removed, 3);
        assert!(!report.unknown_phase);
        assert_eq!(
            cache.keys(),
            vec!["analysis:results".to_string(), "context_query:bundle".to_string()]
        );
    }

    #[test]
    fn test_rerun_of_last_phase_touches_only_itself() {
        let cache = populated();
        let report = invalidator().on_phase_rerun(&cache, "quality");
        assert_eq!(report.removed, 1);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_unknown_phase_falls_back_to_exact_phase() {
        let cache = populated();
        cache
            .set_raw("hotfix:patch", "{}", "hotfix", SetOptions::session())
            .unwrap();

        let report = invalidator().on_phase_rerun(&cache, "hotfix");
        assert!(report.unknown_phase);
        assert_eq!(report.removed, 1);
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn test_phase_order_queries() {
        let order = invalidator().order().clone();
        assert_eq!(order.position("analysis"), Some(1));
        assert_eq!(order.downstream_of("implementation"), ["quality".to_string()]);
        assert!(order.downstream_of("missing").is_empty());
        assert!(order.from_phase("missing").is_none());
    }

    #[test]
    fn test_invalidate_key() {
        let cache = populated();
        let inv = invalidator();
        assert!(inv.invalidate_key(&cache, "analysis:results"));
        assert!(!inv.invalidate_key(&cache, "analysis:results"));
    }
}
