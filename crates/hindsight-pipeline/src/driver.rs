//! Sequential phase execution with phase-skip resumption.
//!
//! For each declared phase the driver checks for a `"{phase}:completed"`
//! marker. A marked phase is skipped outright; its cached outputs are
//! reused. An unmarked phase first has its own and downstream entries
//! invalidated, then runs, then gets a marker and a checkpoint.

use std::sync::Arc;

use async_trait::async_trait;
use hindsight_cache::{CacheInvalidator, CacheKey, PhaseOrder, SessionCache, SetOptions};
use hindsight_types::{Domain, GateResult, now};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::recovery::RecoveryManager;
use crate::state::{PhaseRecord, ResumePlan, RunReport, RunStatus, SessionState};

/// Context handed to a phase for one execution.
#[derive(Debug, Clone)]
pub struct PhaseContext {
    pub session_id: String,
    pub domain: Domain,
    /// The originating request text.
    pub request: String,
    /// Cancelled when the run is being torn down.
    pub cancellation: CancellationToken,
}

impl PhaseContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// What a phase reports back besides its cache writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseOutcome {
    pub gates: Vec<GateResult>,
}

impl PhaseOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate(mut self, gate: GateResult) -> Self {
        self.gates.push(gate);
        self
    }
}

/// One step of a pipeline.
///
/// Phases communicate only through the session cache. A phase must not have
/// side effects beyond what it caches, otherwise skipping it on resume is
/// not equivalent to running it.
#[async_trait]
pub trait Phase: Send + Sync {
    /// Name used as the cache phase tag. Must be a valid key segment.
    fn name(&self) -> &str;

    async fn execute(&self, cache: &SessionCache, ctx: &PhaseContext) -> Result<PhaseOutcome>;
}

/// Runs phases in order against one session cache.
pub struct PipelineDriver {
    phases: Vec<Arc<dyn Phase>>,
    invalidator: CacheInvalidator,
    recovery: RecoveryManager,
}

impl std::fmt::Debug for PipelineDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDriver")
            .field("phases", &self.phase_names())
            .field("recovery", &self.recovery)
            .finish()
    }
}

impl PipelineDriver {
    /// Invalidation order defaults to the order of `phases`.
    pub fn new(phases: Vec<Arc<dyn Phase>>, recovery: RecoveryManager) -> Self {
        let order = PhaseOrder::new(phases.iter().map(|p| p.name().to_string()));
        Self {
            phases,
            invalidator: CacheInvalidator::new(order),
            recovery,
        }
    }

    /// Use a declared phase order for downstream invalidation.
    pub fn with_phase_order(mut self, order: PhaseOrder) -> Self {
        self.invalidator = CacheInvalidator::new(order);
        self
    }

    pub fn phase_names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name()).collect()
    }

    pub fn recovery(&self) -> &RecoveryManager {
        &self.recovery
    }

    /// Which phases a run against `cache` would skip and which it would execute.
    ///
    /// Mirrors the invalidation `run` applies: once a phase has to execute,
    /// every phase downstream of it in the phase order executes too, marker
    /// or not.
    pub fn plan(&self, cache: &SessionCache) -> ResumePlan {
        let mut plan = ResumePlan::default();
        let mut stale: Vec<&str> = Vec::new();
        for phase in &self.phases {
            let name = phase.name();
            if is_completed(cache, name) && !stale.contains(&name) {
                plan.skipped.push(name.to_string());
                continue;
            }
            match self.invalidator.order().from_phase(name) {
                Some(affected) => stale.extend(affected.iter().map(String::as_str)),
                None => stale.push(name),
            }
            plan.to_run.push(name.to_string());
        }
        plan
    }

    /// Execute every phase not yet completed.
    ///
    /// Stops at the first failing phase. Cancellation triggers a bounded
    /// best-effort checkpoint before returning. Checkpoint failures after a
    /// successful phase are logged and do not fail the run.
    pub async fn run(
        &self,
        cache: &SessionCache,
        request: &str,
        cancel: &CancellationToken,
    ) -> RunReport {
        let session_id = cache.session_id().to_string();
        let plan = self.plan(cache);
        if plan.is_resume() {
            info!(session_id = %session_id, "Resuming session: {plan}");
        }

        let mut state = if plan.is_resume() {
            SessionState::Checkpointed
        } else {
            SessionState::Fresh
        };
        advance(&session_id, &mut state, SessionState::Running);

        let ctx = PhaseContext {
            session_id: session_id.clone(),
            domain: cache.domain().clone(),
            request: request.to_string(),
            cancellation: cancel.clone(),
        };
        let mut report = RunReport {
            session_id: session_id.clone(),
            request: request.to_string(),
            status: RunStatus::Completed,
            executed: Vec::new(),
            skipped: Vec::new(),
            gates: Vec::new(),
        };

        for phase in &self.phases {
            let name = phase.name();

            if cancel.is_cancelled() {
                self.cancel(cache, &mut report).await;
                return report;
            }

            if is_completed(cache, name) {
                info!(session_id = %session_id, phase = name, "Skipping phase, completion marker present");
                report.gates.extend(recorded_gates(cache, name));
                report.skipped.push(name.to_string());
                continue;
            }

            let invalidated = self.invalidator.on_phase_rerun(cache, name);
            debug!(
                session_id = %session_id,
                phase = name,
                removed = invalidated.removed,
                "Executing phase"
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                res = phase.execute(cache, &ctx) => Some(res),
            };

            let outcome = match result {
                None => {
                    self.cancel(cache, &mut report).await;
                    return report;
                }
                Some(Err(e)) => {
                    warn!(session_id = %session_id, phase = name, error = %e, "Phase failed");
                    advance(&session_id, &mut state, SessionState::Failed);
                    report.status = RunStatus::Failed {
                        phase: name.to_string(),
                        message: e.to_string(),
                    };
                    return report;
                }
                Some(Ok(outcome)) => outcome,
            };

            if let Err(e) = mark_completed(cache, name, &outcome) {
                warn!(session_id = %session_id, phase = name, error = %e, "Failed to record phase completion");
                advance(&session_id, &mut state, SessionState::Failed);
                report.status = RunStatus::Failed {
                    phase: name.to_string(),
                    message: e.to_string(),
                };
                return report;
            }
            report.gates.extend(outcome.gates);
            report.executed.push(name.to_string());

            if self.recovery.checkpoint_with_retry(cache).await.is_ok() {
                advance(&session_id, &mut state, SessionState::Checkpointed);
                advance(&session_id, &mut state, SessionState::Running);
            }
        }

        advance(&session_id, &mut state, SessionState::Completed);
        info!(
            session_id = %session_id,
            executed = report.executed.len(),
            skipped = report.skipped.len(),
            "Pipeline completed"
        );
        report
    }

    async fn cancel(&self, cache: &SessionCache, report: &mut RunReport) {
        info!(session_id = %cache.session_id(), "Pipeline cancelled, checkpointing");
        // Errors are logged inside; the run is unwinding either way.
        let _ = self.recovery.checkpoint_on_cancel(cache).await;
        report.status = RunStatus::Cancelled;
    }
}

fn is_completed(cache: &SessionCache, phase: &str) -> bool {
    CacheKey::completed(phase).is_ok_and(|key| cache.contains(key))
}

fn recorded_gates(cache: &SessionCache, phase: &str) -> Vec<GateResult> {
    let record = CacheKey::completed(phase)
        .map_err(PipelineError::from)
        .and_then(|key| Ok(cache.get::<PhaseRecord>(key)?));
    match record {
        Ok(Some(record)) => record.gates,
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(phase, error = %e, "Unreadable completion marker, gates unknown");
            Vec::new()
        }
    }
}

fn mark_completed(cache: &SessionCache, phase: &str, outcome: &PhaseOutcome) -> Result<()> {
    let record = PhaseRecord {
        phase: phase.to_string(),
        completed_at: now(),
        gates: outcome.gates.clone(),
    };
    cache.set(CacheKey::completed(phase)?, &record, phase, SetOptions::session())?;
    Ok(())
}

fn advance(session_id: &str, state: &mut SessionState, next: SessionState) {
    match state.transition(next) {
        Ok(s) => {
            debug!(session_id, from = %state, to = %s, "Session state");
            *state = s;
        }
        Err(e) => warn!(session_id, error = %e, "Ignoring session state change"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hindsight_cache::CacheConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Counting {
        name: &'static str,
        runs: AtomicUsize,
        fail: bool,
    }

    impl Counting {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                runs: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                runs: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl Phase for Counting {
        fn name(&self) -> &str {
            self.name
        }

        async fn execute(&self, cache: &SessionCache, _ctx: &PhaseContext) -> Result<PhaseOutcome> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PipelineError::phase_failed(self.name, "boom"));
            }
            cache.set(
                format!("{}:output", self.name),
                &self.name,
                self.name,
                SetOptions::session(),
            )?;
            Ok(PhaseOutcome::new().with_gate(GateResult::pass(format!("{}_gate", self.name))))
        }
    }

    fn driver(dir: &TempDir, phases: &[&Arc<Counting>]) -> PipelineDriver {
        let phases: Vec<Arc<dyn Phase>> = phases
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn Phase>)
            .collect();
        let recovery =
            RecoveryManager::new(dir.path().join("checkpoints"), dir.path().join("evidence"));
        PipelineDriver::new(phases, recovery)
    }

    #[tokio::test]
    async fn test_runs_all_phases_and_marks_them() {
        let dir = TempDir::new().unwrap();
        let a = Counting::new("analysis");
        let b = Counting::new("planning");
        let driver = driver(&dir, &[&a, &b]);
        let cache = SessionCache::new(Domain::Web, &CacheConfig::default());

        let report = driver.run(&cache, "req", &CancellationToken::new()).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.executed, vec!["analysis", "planning"]);
        assert!(cache.contains("analysis:completed"));
        assert!(cache.contains("planning:completed"));
        assert_eq!(report.gates.len(), 2);
        assert!(driver.recovery().checkpoint_path(cache.session_id()).unwrap().exists());
    }

    #[tokio::test]
    async fn test_completed_phases_are_skipped_with_their_gates() {
        let dir = TempDir::new().unwrap();
        let a = Counting::new("analysis");
        let b = Counting::new("planning");
        let driver = driver(&dir, &[&a, &b]);
        let cache = SessionCache::new(Domain::Web, &CacheConfig::default());
        driver.run(&cache, "req", &CancellationToken::new()).await;

        assert_eq!(driver.plan(&cache).to_run, Vec::<String>::new());
        let second = driver.run(&cache, "req", &CancellationToken::new()).await;

        assert_eq!(a.runs.load(Ordering::SeqCst), 1);
        assert_eq!(b.runs.load(Ordering::SeqCst), 1);
        assert_eq!(second.skipped, vec!["analysis", "planning"]);
        assert!(second.executed.is_empty());
        assert!(second.gates_passed(&["analysis_gate".into(), "planning_gate".into()]));
    }

    #[tokio::test]
    async fn test_failure_stops_the_run() {
        let dir = TempDir::new().unwrap();
        let a = Counting::new("analysis");
        let b = Counting::failing("planning");
        let c = Counting::new("implementation");
        let driver = driver(&dir, &[&a, &b, &c]);
        let cache = SessionCache::new(Domain::Web, &CacheConfig::default());

        let report = driver.run(&cache, "req", &CancellationToken::new()).await;

        assert_eq!(
            report.status,
            RunStatus::Failed {
                phase: "planning".into(),
                message: "Phase 'planning' failed: boom".into()
            }
        );
        assert_eq!(report.executed, vec!["analysis"]);
        assert_eq!(c.runs.load(Ordering::SeqCst), 0);
        assert!(!cache.contains("planning:completed"));
    }

    #[tokio::test]
    async fn test_rerun_invalidates_downstream_entries() {
        let dir = TempDir::new().unwrap();
        let a = Counting::new("analysis");
        let b = Counting::new("planning");
        let driver = driver(&dir, &[&a, &b]);
        let cache = SessionCache::new(Domain::Web, &CacheConfig::default());
        driver.run(&cache, "req", &CancellationToken::new()).await;

        // Forcing analysis to re-run drops planning's outputs and marker too.
        cache.delete("analysis:completed");
        let plan = driver.plan(&cache);
        assert_eq!(plan.to_run, vec!["analysis", "planning"]);
        assert!(plan.skipped.is_empty());
        let report = driver.run(&cache, "req", &CancellationToken::new()).await;

        assert_eq!(plan.to_run, report.executed);
        assert_eq!(b.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_plan_matches_run_after_upstream_invalidation() {
        let dir = TempDir::new().unwrap();
        let a = Counting::new("analysis");
        let b = Counting::new("planning");
        let c = Counting::new("implementation");
        let driver = driver(&dir, &[&a, &b, &c]);
        let cache = SessionCache::new(Domain::Web, &CacheConfig::default());
        driver.run(&cache, "req", &CancellationToken::new()).await;

        cache.invalidate_phase("analysis");
        let plan = driver.plan(&cache);
        assert_eq!(
            plan.to_string(),
            "reusing: none; executing: analysis, planning, implementation"
        );

        let report = driver.run(&cache, "req", &CancellationToken::new()).await;
        assert_eq!(plan.skipped, report.skipped);
        assert_eq!(plan.to_run, report.executed);
    }

    #[tokio::test]
    async fn test_plan_reuses_phases_upstream_of_first_gap() {
        let dir = TempDir::new().unwrap();
        let a = Counting::new("analysis");
        let b = Counting::new("planning");
        let c = Counting::new("implementation");
        let driver = driver(&dir, &[&a, &b, &c]);
        let cache = SessionCache::new(Domain::Web, &CacheConfig::default());
        driver.run(&cache, "req", &CancellationToken::new()).await;

        cache.invalidate_phase("planning");
        let plan = driver.plan(&cache);
        assert_eq!(plan.skipped, vec!["analysis"]);
        assert_eq!(plan.to_run, vec!["planning", "implementation"]);

        let report = driver.run(&cache, "req", &CancellationToken::new()).await;
        assert_eq!(plan.skipped, report.skipped);
        assert_eq!(plan.to_run, report.executed);
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_executes_nothing() {
        let dir = TempDir::new().unwrap();
        let a = Counting::new("analysis");
        let driver = driver(&dir, &[&a]);
        let cache = SessionCache::new(Domain::Web, &CacheConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = driver.run(&cache, "req", &cancel).await;

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(a.runs.load(Ordering::SeqCst), 0);
        assert!(driver.recovery().checkpoint_path(cache.session_id()).unwrap().exists());
    }
}
