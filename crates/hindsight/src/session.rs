//! Session orchestration: config, store, loader, driver, extractor, recovery.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hindsight_cache::{
    CONTEXT_QUERY_PHASE, CacheConfig, CacheKey, PhaseOrder, SessionCache, SetOptions,
    spawn_sweeper,
};
use hindsight_config::{HindsightConfig, load_config, resolve_path};
use hindsight_knowledge::KnowledgeStore;
use hindsight_pipeline::{
    CancellationToken, ContextLoader, LearningExtractor, PersistPolicy, PersistReport, Phase,
    PhaseRecord, PipelineDriver, RecoveryManager, ResumePlan, RunReport, RunStatus,
    SessionState, policy_for,
};
use hindsight_types::{Domain, now};
use tracing::{info, warn};

use crate::error::Result;

/// How [`Hindsight::finish`] wrapped up a session.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishReport {
    pub state: SessionState,
    /// Present when learnings were extracted and a store was available.
    pub persist: Option<PersistReport>,
    /// Postmortem copy written for a terminal failure.
    pub evidence: Option<PathBuf>,
}

/// Entry point for hosts running pipelines with hindsight memory.
///
/// ```no_run
/// # async fn demo() -> hindsight::Result<()> {
/// use hindsight::{CancellationToken, Domain, Hindsight};
///
/// let hindsight = Hindsight::discover(std::path::Path::new("."))?;
/// let cache = hindsight.begin(Domain::Web, "add a button")?;
/// let report = hindsight.run(&cache, "add a button", &CancellationToken::new()).await;
/// hindsight.finish(&cache, &report, false);
/// # Ok(())
/// # }
/// ```
pub struct Hindsight {
    config: HindsightConfig,
    project_root: PathBuf,
    store: Option<Arc<KnowledgeStore>>,
    loader: ContextLoader,
    recovery: RecoveryManager,
    extractor: LearningExtractor,
    policy: Box<dyn PersistPolicy>,
    cache_config: CacheConfig,
    phase_order: PhaseOrder,
    phases: Vec<Arc<dyn Phase>>,
}

impl std::fmt::Debug for Hindsight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hindsight")
            .field("project_root", &self.project_root)
            .field("store", &self.store.is_some())
            .field("recovery", &self.recovery)
            .field("phases", &self.phases.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Hindsight {
    /// Load layered configuration for `project_root` and open.
    pub fn discover(project_root: &Path) -> Result<Self> {
        let loaded = load_config(project_root)?;
        for warning in &loaded.warnings {
            warn!("{warning}");
        }
        Self::open(loaded.config, project_root)
    }

    /// Open with an explicit configuration.
    ///
    /// A knowledge store that cannot be opened is not fatal: sessions get
    /// empty context bundles and learnings are dropped with a warning.
    pub fn open(config: HindsightConfig, project_root: &Path) -> Result<Self> {
        config.validate()?;

        let knowledge = config.knowledge();
        let db_path = resolve_path(project_root, &knowledge.database);
        let store = match KnowledgeStore::open_with_timeout(&db_path, knowledge.busy_timeout()) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(path = %db_path.display(), error = %e, "Knowledge store unavailable, continuing without learned context");
                None
            }
        };
        let loader = match &store {
            Some(store) => ContextLoader::from_config(store.clone(), &knowledge),
            None => ContextLoader::detached(),
        };

        let cache_section = config.cache();
        let mut cache_config = CacheConfig::new().with_default_ttl(cache_section.default_ttl());
        if let Some(interval) = cache_section.sweep_interval() {
            cache_config = cache_config.with_sweep_interval(interval);
        }

        let pipeline = config.pipeline();
        let recovery = RecoveryManager::from_config(&config.recovery(), project_root);
        let policy = policy_for(config.learning().persist);

        Ok(Self {
            project_root: project_root.to_path_buf(),
            store,
            loader,
            recovery,
            extractor: LearningExtractor::new(pipeline.required_gates.clone()),
            policy,
            cache_config,
            phase_order: PhaseOrder::new(pipeline.phases),
            phases: Vec::new(),
            config,
        })
    }

    /// Register the next phase to run. Phases run in registration order.
    pub fn with_phase(mut self, phase: Arc<dyn Phase>) -> Self {
        self.phases.push(phase);
        self
    }

    /// Replace the persist policy chosen by `[learning] persist`.
    pub fn with_policy(mut self, policy: impl PersistPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn config(&self) -> &HindsightConfig {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn store(&self) -> Option<&Arc<KnowledgeStore>> {
        self.store.as_ref()
    }

    pub fn recovery(&self) -> &RecoveryManager {
        &self.recovery
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a fresh session: new cache, context bundle loaded and the
    /// `context_query` phase marked complete.
    pub fn begin(&self, domain: Domain, request: &str) -> Result<Arc<SessionCache>> {
        let cache = Arc::new(SessionCache::new(domain, &self.cache_config));
        self.loader.load_into(&cache, request)?;

        let record = PhaseRecord {
            phase: CONTEXT_QUERY_PHASE.to_string(),
            completed_at: now(),
            gates: Vec::new(),
        };
        cache.set(
            CacheKey::completed(CONTEXT_QUERY_PHASE)?,
            &record,
            CONTEXT_QUERY_PHASE,
            SetOptions::session(),
        )?;

        if let Err(e) = self.recovery.checkpoint(&cache) {
            warn!(session_id = %cache.session_id(), error = %e, "Initial checkpoint failed");
        }
        info!(session_id = %cache.session_id(), domain = %cache.domain(), "Session started");
        self.start_sweeper(&cache);
        Ok(cache)
    }

    /// Reload a checkpointed session. `None` means start fresh.
    pub fn resume(&self, session_id: &str) -> Result<Option<Arc<SessionCache>>> {
        let Some(cache) = self.recovery.resume(session_id)? else {
            return Ok(None);
        };
        let cache = Arc::new(cache);
        info!(session_id, "{}", self.plan(&cache));
        self.start_sweeper(&cache);
        Ok(Some(cache))
    }

    /// Sessions with a resumable checkpoint on disk.
    pub fn pending_sessions(&self) -> Result<Vec<String>> {
        Ok(self.recovery.list_checkpoints()?)
    }

    /// Which registered phases a run would reuse and which it would execute.
    pub fn plan(&self, cache: &SessionCache) -> ResumePlan {
        self.driver().plan(cache)
    }

    /// Run the registered phases against `cache`.
    pub async fn run(
        &self,
        cache: &SessionCache,
        request: &str,
        cancel: &CancellationToken,
    ) -> RunReport {
        self.driver().run(cache, request, cancel).await
    }

    /// Close out a run.
    ///
    /// - Completed: extract learnings, delete the checkpoint.
    /// - Failed or cancelled with `terminal`: extract learnings, retain
    ///   evidence, delete the checkpoint.
    /// - Otherwise: keep the last checkpoint the driver wrote, which holds
    ///   only completed phases, for a later resume; nothing is extracted.
    ///
    /// Call at most once per session with a completed or terminal report;
    /// extraction appends decisions, task history and events every time.
    pub fn finish(&self, cache: &SessionCache, report: &RunReport, terminal: bool) -> FinishReport {
        let session_id = cache.session_id();

        if !report.status.is_completed() && !terminal {
            info!(session_id, status = report.status.as_str(), "Session left resumable");
            return FinishReport {
                state: SessionState::Checkpointed,
                persist: None,
                evidence: None,
            };
        }

        let persist = self.learn(cache, report);

        let (state, evidence) = match report.status {
            RunStatus::Completed => (SessionState::Completed, None),
            _ => {
                let evidence = self
                    .recovery
                    .retain_evidence(cache)
                    .inspect_err(|e| warn!(session_id, error = %e, "Failed to retain evidence"))
                    .ok();
                (SessionState::Failed, evidence)
            }
        };

        if let Err(e) = self.recovery.cleanup(session_id) {
            warn!(session_id, error = %e, "Failed to remove checkpoint");
        }
        info!(session_id, state = %state, "Session finished");

        FinishReport {
            state,
            persist,
            evidence,
        }
    }

    fn learn(&self, cache: &SessionCache, report: &RunReport) -> Option<PersistReport> {
        let Some(store) = &self.store else {
            warn!(session_id = %cache.session_id(), "Knowledge store unavailable, learnings not persisted");
            return None;
        };
        Some(self.extractor.extract_and_persist(
            cache,
            report,
            store.as_ref(),
            self.policy.as_ref(),
        ))
    }

    fn driver(&self) -> PipelineDriver {
        PipelineDriver::new(self.phases.clone(), self.recovery.clone())
            .with_phase_order(self.phase_order.clone())
    }

    fn start_sweeper(&self, cache: &Arc<SessionCache>) {
        let Some(interval) = self.cache_config.sweep_interval else {
            return;
        };
        if tokio::runtime::Handle::try_current().is_ok() {
            spawn_sweeper(cache, interval);
        } else {
            warn!(session_id = %cache.session_id(), "No async runtime, cache sweeper not started");
        }
    }
}
