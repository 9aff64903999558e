//! End-to-end session lifecycle through the facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use hindsight::{
    CancellationToken, ContextLoader, Domain, GateResult, Hindsight, HindsightConfig, NeverPersist,
    Outcome, Phase, PhaseContext, PhaseOutcome, PipelineError, RunStatus, SessionCache,
    SessionState, SetOptions,
};
use hindsight_config::KnowledgeSection;
use serde_json::json;
use tempfile::tempdir;

/// Phase writing a fixed JSON payload under `{name}:{kind}`.
struct ScriptedPhase {
    name: &'static str,
    kind: &'static str,
    payload: serde_json::Value,
    gates: Vec<GateResult>,
    runs: AtomicUsize,
    fail_next: AtomicBool,
}

impl ScriptedPhase {
    fn new(name: &'static str, kind: &'static str, payload: serde_json::Value) -> Self {
        Self {
            name,
            kind,
            payload,
            gates: Vec::new(),
            runs: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    fn with_gate(mut self, gate: GateResult) -> Self {
        self.gates.push(gate);
        self
    }

    fn failing_once(self) -> Self {
        self.fail_next.store(true, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl Phase for ScriptedPhase {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        cache: &SessionCache,
        _ctx: &PhaseContext,
    ) -> hindsight_pipeline::Result<PhaseOutcome> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            cache.set(
                format!("{}:partial", self.name),
                &"half-written",
                self.name,
                SetOptions::session(),
            )?;
            return Err(PipelineError::phase_failed(self.name, "tool crashed"));
        }
        cache.set(
            format!("{}:{}", self.name, self.kind),
            &self.payload,
            self.name,
            SetOptions::session(),
        )?;
        Ok(PhaseOutcome {
            gates: self.gates.clone(),
        })
    }
}

fn web_phases() -> Vec<Arc<ScriptedPhase>> {
    vec![
        Arc::new(ScriptedPhase::new(
            "analysis",
            "results",
            json!({"components": ["Header"]}),
        )),
        Arc::new(ScriptedPhase::new(
            "planning",
            "plan",
            json!({"architecturalDecisions": [
                {"decision": "Reuse the Button primitive", "reasoning": "One source of styling"}
            ]}),
        )),
        Arc::new(ScriptedPhase::new(
            "implementation",
            "changes",
            json!({"files_modified": ["src/Header.tsx", "src/Button.tsx"]}),
        )),
        Arc::new(
            ScriptedPhase::new(
                "quality",
                "violations",
                json!([{"rule": "no_inline_styles", "category": "styling", "severity": "high",
                        "offending": "style={{color: 'red'}}", "fixed": "className=\"danger\""}]),
            )
            .with_gate(GateResult::pass("standards_gate"))
            .with_gate(GateResult::pass("test_gate")),
        ),
    ]
}

fn with_phases(hindsight: Hindsight, phases: &[Arc<ScriptedPhase>]) -> Hindsight {
    phases.iter().fold(hindsight, |h, p| {
        h.with_phase(Arc::clone(p) as Arc<dyn Phase>)
    })
}

#[tokio::test]
async fn test_fresh_project_gets_empty_context() {
    let dir = tempdir().unwrap();
    let hindsight = Hindsight::open(HindsightConfig::new(), dir.path()).unwrap();
    assert!(hindsight.store().is_some());

    let cache = hindsight.begin(Domain::Web, "add a button").unwrap();
    let bundle = ContextLoader::cached_bundle(&cache).unwrap().unwrap();

    assert!(bundle.relevant_files.is_empty());
    assert!(bundle.past_decisions.is_empty());
    assert!(bundle.related_standards.is_empty());
    assert!(bundle.similar_tasks.is_empty());
    assert!(cache.contains("context_query:completed"));
    assert!(dir.path().join(".hindsight/knowledge.db").exists());
}

#[tokio::test]
async fn test_second_session_sees_learned_standard() {
    let dir = tempdir().unwrap();

    {
        let hindsight = with_phases(
            Hindsight::open(HindsightConfig::new(), dir.path()).unwrap(),
            &web_phases(),
        );
        let cache = hindsight.begin(Domain::Web, "add a header button").unwrap();
        let report = hindsight
            .run(&cache, "add a header button", &CancellationToken::new())
            .await;
        assert_eq!(report.status, RunStatus::Completed);

        let finish = hindsight.finish(&cache, &report, false);
        assert_eq!(finish.state, SessionState::Completed);
        let persist = finish.persist.unwrap();
        assert_eq!(persist.standards_inserted, 1);
        assert_eq!(persist.decisions, 1);
        assert!(hindsight.pending_sessions().unwrap().is_empty());
    }

    let hindsight = Hindsight::open(HindsightConfig::new(), dir.path()).unwrap();
    let cache = hindsight.begin(Domain::Web, "add a footer button").unwrap();
    let bundle = ContextLoader::cached_bundle(&cache).unwrap().unwrap();

    assert_eq!(bundle.related_standards.len(), 1);
    assert_eq!(bundle.related_standards[0].rule, "no_inline_styles");
    assert_eq!(bundle.past_decisions[0].decision, "Reuse the Button primitive");
    assert_eq!(bundle.similar_tasks.len(), 1);
    assert_eq!(bundle.similar_tasks[0].outcome, Outcome::Success);
    assert_eq!(bundle.relevant_files, vec!["src/Header.tsx", "src/Button.tsx"]);

    // Other domains do not see web standards.
    let mobile = hindsight.begin(Domain::Mobile, "add a button").unwrap();
    let mobile_bundle = ContextLoader::cached_bundle(&mobile).unwrap().unwrap();
    assert!(mobile_bundle.related_standards.is_empty());
}

#[tokio::test]
async fn test_failed_session_resumes_after_restart() {
    let dir = tempdir().unwrap();
    let phases = web_phases();
    let session_id = {
        let flaky = Arc::new(
            ScriptedPhase::new(
                "implementation",
                "changes",
                json!({"files_modified": ["src/Header.tsx"]}),
            )
            .failing_once(),
        );
        let mut first_phases = phases.clone();
        first_phases[2] = flaky;

        let hindsight = with_phases(
            Hindsight::open(HindsightConfig::new(), dir.path()).unwrap(),
            &first_phases,
        );
        let cache = hindsight.begin(Domain::Web, "add a header button").unwrap();
        let report = hindsight
            .run(&cache, "add a header button", &CancellationToken::new())
            .await;
        assert!(matches!(report.status, RunStatus::Failed { .. }));
        assert_eq!(report.executed, vec!["analysis", "planning"]);

        let finish = hindsight.finish(&cache, &report, false);
        assert_eq!(finish.state, SessionState::Checkpointed);
        assert!(finish.persist.is_none());
        cache.session_id().to_string()
    };

    let hindsight = with_phases(
        Hindsight::open(HindsightConfig::new(), dir.path()).unwrap(),
        &phases,
    );
    assert_eq!(hindsight.pending_sessions().unwrap(), vec![session_id.clone()]);

    let cache = hindsight.resume(&session_id).unwrap().unwrap();
    // Only completed phases were checkpointed.
    assert!(!cache.contains("implementation:partial"));
    assert!(cache.contains("planning:plan"));
    let plan = hindsight.plan(&cache);
    assert_eq!(plan.skipped, vec!["analysis", "planning"]);
    assert_eq!(plan.to_run, vec!["implementation", "quality"]);

    let report = hindsight
        .run(&cache, "add a header button", &CancellationToken::new())
        .await;
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.executed, vec!["implementation", "quality"]);
    // Analysis ran once, in the first attempt; the resumed run reused it.
    assert_eq!(phases[0].runs.load(Ordering::SeqCst), 1);
    assert_eq!(phases[2].runs.load(Ordering::SeqCst), 1);

    let finish = hindsight.finish(&cache, &report, false);
    assert_eq!(finish.state, SessionState::Completed);
    assert!(hindsight.pending_sessions().unwrap().is_empty());
    assert!(hindsight.resume(&session_id).unwrap().is_none());
}

#[tokio::test]
async fn test_terminal_failure_retains_evidence() {
    let dir = tempdir().unwrap();
    let phases = vec![Arc::new(
        ScriptedPhase::new("analysis", "results", json!({})).failing_once(),
    )];
    let hindsight = with_phases(
        Hindsight::open(HindsightConfig::new(), dir.path()).unwrap(),
        &phases,
    )
    .with_policy(NeverPersist);

    let cache = hindsight.begin(Domain::Data, "load the csv").unwrap();
    let report = hindsight
        .run(&cache, "load the csv", &CancellationToken::new())
        .await;
    let finish = hindsight.finish(&cache, &report, true);

    assert_eq!(finish.state, SessionState::Failed);
    let evidence = finish.evidence.unwrap();
    assert!(evidence.exists());
    assert!(evidence.starts_with(dir.path().join(".hindsight/evidence")));
    assert!(hindsight.pending_sessions().unwrap().is_empty());

    let persist = finish.persist.unwrap();
    assert_eq!(persist.task_history, 1);
    let store = hindsight.store().unwrap();
    let tasks = store.recent_tasks(&Domain::Data, 10).unwrap();
    assert_eq!(tasks[0].outcome, Outcome::Failure);
}

#[tokio::test]
async fn test_unreachable_store_degrades_to_empty_context() {
    let dir = tempdir().unwrap();
    let db_dir = dir.path().join("db-is-a-directory");
    std::fs::create_dir_all(&db_dir).unwrap();
    let config = HindsightConfig {
        knowledge: Some(KnowledgeSection {
            database: db_dir,
            ..KnowledgeSection::default()
        }),
        ..HindsightConfig::default()
    };

    let hindsight = with_phases(Hindsight::open(config, dir.path()).unwrap(), &web_phases());
    assert!(hindsight.store().is_none());

    let cache = hindsight.begin(Domain::Web, "add a button").unwrap();
    assert!(ContextLoader::cached_bundle(&cache).unwrap().unwrap().is_empty());

    let report = hindsight
        .run(&cache, "add a button", &CancellationToken::new())
        .await;
    let finish = hindsight.finish(&cache, &report, false);
    assert_eq!(finish.state, SessionState::Completed);
    assert!(finish.persist.is_none());
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempdir().unwrap();
    let config = HindsightConfig::from_toml("[pipeline]\nphases = []\n").unwrap();
    assert!(matches!(
        Hindsight::open(config, dir.path()),
        Err(hindsight::Error::Config(_))
    ));
}
