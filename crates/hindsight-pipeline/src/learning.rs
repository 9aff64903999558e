//! Promotion of session findings into durable knowledge.
//!
//! Runs once at the end of a session, success or terminal failure. The
//! derivation is a fixed set of rules over cache entries:
//!
//! 1. `planning` entries holding an `architecturalDecisions` list yield one
//!    [`Decision`] per item.
//! 2. Entries whose key kind is `violations` yield one [`Standard`] per
//!    distinct rule, with offending/fixed examples.
//! 3. One [`TaskHistoryEntry`] summarising request, outcome and modified files.
//! 4. One `pipeline_execution` [`Event`] recording phases and gate results.
//!
//! Standards are idempotent through the store's upsert. Decisions, task
//! history and events are not: callers invoke extraction once per session.

use hindsight_cache::{CacheEntry, CacheKey, SessionCache};
use hindsight_knowledge::{KnowledgeBackend, UpsertOutcome};
use hindsight_types::{
    Decision, Domain, EnforcementLevel, Event, Outcome, Standard, StandardExample,
    TaskHistoryEntry,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::policy::PersistPolicy;
use crate::state::RunReport;

const PLANNING_PHASE: &str = "planning";
const IMPLEMENTATION_PHASE: &str = "implementation";
const VIOLATIONS_KIND: &str = "violations";

/// Everything derived from one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Learnings {
    pub decisions: Vec<Decision>,
    pub standards: Vec<Standard>,
    pub task: TaskHistoryEntry,
    pub event: Event,
}

/// What [`LearningExtractor::persist`] wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    pub decisions: usize,
    pub standards_inserted: usize,
    /// Candidates whose `(domain, rule)` was already stored.
    pub standards_known: usize,
    /// Candidates rejected by the persist policy.
    pub standards_declined: usize,
    pub task_history: usize,
    pub events: usize,
    /// Errors from individual writes, logged and swallowed.
    pub failures: Vec<String>,
}

impl PersistReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Derives learnings from a finished session and writes them to a store.
#[derive(Debug, Clone)]
pub struct LearningExtractor {
    required_gates: Vec<String>,
}

impl LearningExtractor {
    /// `required_gates` decide whether the task counts as a success.
    pub fn new(required_gates: Vec<String>) -> Self {
        Self { required_gates }
    }

    pub fn required_gates(&self) -> &[String] {
        &self.required_gates
    }

    /// Apply the derivation rules. Pure: touches neither cache hit counts
    /// nor the store.
    pub fn extract(&self, cache: &SessionCache, results: &RunReport) -> Learnings {
        let domain = cache.domain().clone();
        let entries = cache.entries();

        let decisions = derive_decisions(&domain, &entries);
        let standards = derive_standards(&domain, &entries);

        let success = results.status.is_completed() && results.gates_passed(&self.required_gates);
        let outcome = if success {
            Outcome::Success
        } else {
            Outcome::Failure
        };

        let mut learnings_text: Vec<String> = standards
            .iter()
            .map(|s| format!("standard: {}", s.rule))
            .collect();
        learnings_text.extend(
            results
                .latest_gates()
                .into_iter()
                .filter(|g| !g.passed)
                .map(|g| format!("gate failed: {}", g.gate)),
        );

        let task = TaskHistoryEntry::new(domain.clone(), results.request.clone(), outcome)
            .with_learnings(learnings_text)
            .with_files(modified_files(&entries));

        let latest = results.latest_gates();
        let event = Event::pipeline_execution(
            domain,
            json!({
                "session_id": results.session_id,
                "request": results.request,
                "status": results.status.as_str(),
                "outcome": outcome.as_str(),
                "phases_run": results.executed,
                "phases_skipped": results.skipped,
                "gates_passed": latest.iter().filter(|g| g.passed).map(|g| &g.gate).collect::<Vec<_>>(),
                "gates_failed": latest.iter().filter(|g| !g.passed).map(|g| &g.gate).collect::<Vec<_>>(),
                "cache": cache.stats(),
            }),
        );

        debug!(
            session_id = %cache.session_id(),
            decisions = decisions.len(),
            standards = standards.len(),
            outcome = outcome.as_str(),
            "Learnings extracted"
        );

        Learnings {
            decisions,
            standards,
            task,
            event,
        }
    }

    /// Write learnings. Best-effort: every failure is logged and recorded in
    /// the report, none is returned.
    pub fn persist(
        &self,
        learnings: &Learnings,
        store: &dyn KnowledgeBackend,
        policy: &dyn PersistPolicy,
    ) -> PersistReport {
        let mut report = PersistReport::default();

        for decision in &learnings.decisions {
            match store.insert_decision(decision) {
                Ok(()) => report.decisions += 1,
                Err(e) => record_failure("decision", &e, &mut report),
            }
        }

        for standard in &learnings.standards {
            if !policy.should_persist(standard) {
                debug!(rule = %standard.rule, "Standard declined by policy");
                report.standards_declined += 1;
                continue;
            }
            match store.upsert_standard(standard) {
                Ok(UpsertOutcome::Inserted(id)) => {
                    info!(id, domain = %standard.domain, rule = %standard.rule, "Learned new standard");
                    report.standards_inserted += 1;
                }
                Ok(UpsertOutcome::Existing(id)) => {
                    debug!(id, rule = %standard.rule, "Standard already known");
                    report.standards_known += 1;
                }
                Err(e) => record_failure("standard", &e, &mut report),
            }
        }

        match store.insert_task_history(&learnings.task) {
            Ok(()) => report.task_history += 1,
            Err(e) => record_failure("task_history", &e, &mut report),
        }

        match store.insert_event(&learnings.event) {
            Ok(()) => report.events += 1,
            Err(e) => record_failure("event", &e, &mut report),
        }

        info!(
            decisions = report.decisions,
            standards_inserted = report.standards_inserted,
            standards_known = report.standards_known,
            failures = report.failures.len(),
            "Learnings persisted"
        );
        report
    }

    /// [`extract`](Self::extract) then [`persist`](Self::persist).
    pub fn extract_and_persist(
        &self,
        cache: &SessionCache,
        results: &RunReport,
        store: &dyn KnowledgeBackend,
        policy: &dyn PersistPolicy,
    ) -> PersistReport {
        let learnings = self.extract(cache, results);
        self.persist(&learnings, store, policy)
    }
}

fn record_failure(what: &str, err: &dyn std::fmt::Display, report: &mut PersistReport) {
    warn!(record = what, error = %err, "Failed to persist learning");
    report.failures.push(format!("{what}: {err}"));
}

fn json_payload(entry: &CacheEntry) -> Option<Value> {
    serde_json::from_slice(entry.value.as_bytes()).ok()
}

fn str_field<'a>(obj: &'a Value, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|n| obj.get(*n).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Rule 1: decisions
// ─────────────────────────────────────────────────────────────────────────────

fn derive_decisions(domain: &Domain, entries: &[CacheEntry]) -> Vec<Decision> {
    let mut decisions = Vec::new();
    for entry in entries.iter().filter(|e| e.created_by_phase == PLANNING_PHASE) {
        let Some(payload) = json_payload(entry) else {
            continue;
        };
        let Some(items) = payload
            .get("architecturalDecisions")
            .or_else(|| payload.get("architectural_decisions"))
            .and_then(Value::as_array)
        else {
            continue;
        };

        for item in items {
            let decision = match item {
                Value::String(text) if !text.trim().is_empty() => {
                    Decision::new(domain.clone(), text.trim(), "")
                }
                Value::Object(_) => {
                    let Some(text) = str_field(item, &["decision", "title"]) else {
                        continue;
                    };
                    let reasoning = str_field(item, &["reasoning", "rationale"]).unwrap_or_default();
                    let mut d = Decision::new(domain.clone(), text, reasoning);
                    if let Some(context) = str_field(item, &["context"]) {
                        d = d.with_context(context);
                    }
                    d
                }
                _ => continue,
            };
            decisions.push(decision);
        }
    }
    decisions
}

// ─────────────────────────────────────────────────────────────────────────────
// Rule 2: standards
// ─────────────────────────────────────────────────────────────────────────────

fn is_violations_key(key: &str) -> bool {
    CacheKey::parse(key).is_ok_and(|k| k.kind() == VIOLATIONS_KIND)
}

fn derive_standards(domain: &Domain, entries: &[CacheEntry]) -> Vec<Standard> {
    let mut standards: Vec<Standard> = Vec::new();

    for entry in entries.iter().filter(|e| is_violations_key(&e.key)) {
        let Some(payload) = json_payload(entry) else {
            continue;
        };
        let violations = match &payload {
            Value::Array(items) => items.as_slice(),
            Value::Object(_) => match payload.get("violations").and_then(Value::as_array) {
                Some(items) => items.as_slice(),
                None => std::slice::from_ref(&payload),
            },
            _ => continue,
        };

        for violation in violations {
            let Some(rule) = str_field(violation, &["rule"]) else {
                continue;
            };
            let example = StandardExample {
                offending: str_field(violation, &["offending", "before"]).map(String::from),
                fixed: str_field(violation, &["fixed", "after"]).map(String::from),
            };
            let has_example = example.offending.is_some() || example.fixed.is_some();

            if let Some(existing) = standards.iter_mut().find(|s| s.rule == rule) {
                if has_example && !existing.examples.contains(&example) {
                    existing.examples.push(example);
                }
                continue;
            }

            let category = str_field(violation, &["category"]).unwrap_or(&entry.created_by_phase);
            let rationale = str_field(violation, &["rationale", "message", "description"])
                .map(String::from)
                .unwrap_or_else(|| format!("Violated during {}", entry.created_by_phase));
            let level = str_field(violation, &["severity"])
                .map(EnforcementLevel::from_severity)
                .unwrap_or(EnforcementLevel::Recommended);

            let mut standard =
                Standard::new(domain.clone(), category, rule, rationale).with_enforcement(level);
            if has_example {
                standard = standard.with_example(example);
            }
            standards.push(standard);
        }
    }
    standards
}

// ─────────────────────────────────────────────────────────────────────────────
// Rule 3: modified files
// ─────────────────────────────────────────────────────────────────────────────

fn modified_files(entries: &[CacheEntry]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for entry in entries
        .iter()
        .filter(|e| e.created_by_phase == IMPLEMENTATION_PHASE)
    {
        let Some(payload) = json_payload(entry) else {
            continue;
        };
        let Some(list) = payload
            .get("files_modified")
            .or_else(|| payload.get("filesModified"))
            .and_then(Value::as_array)
        else {
            continue;
        };
        for file in list.iter().filter_map(Value::as_str) {
            if !files.iter().any(|f| f == file) {
                files.push(file.to_string());
            }
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{AlwaysPersist, NeverPersist};
    use crate::state::RunStatus;
    use hindsight_cache::{CacheConfig, SetOptions};
    use hindsight_knowledge::KnowledgeStore;
    use hindsight_types::GateResult;

    fn report(status: RunStatus, gates: Vec<GateResult>) -> RunReport {
        RunReport {
            session_id: "abc123".into(),
            request: "add a dark mode toggle".into(),
            status,
            executed: vec!["analysis".into(), "planning".into(), "implementation".into()],
            skipped: vec![],
            gates,
        }
    }

    fn populated_cache() -> SessionCache {
        let cache = SessionCache::new(Domain::Web, &CacheConfig::default());
        cache
            .set(
                "planning:plan",
                &json!({
                    "architecturalDecisions": [
                        "Use CSS variables for theming",
                        {"decision": "Persist preference in localStorage", "reasoning": "No backend needed", "context": "toggle"},
                        {"reasoning": "missing decision text"},
                        42
                    ]
                }),
                "planning",
                SetOptions::session(),
            )
            .unwrap();
        cache
            .set(
                "quality:violations",
                &json!([
                    {"rule": "no_inline_styles", "category": "styling", "severity": "high",
                     "offending": "<div style=\"color:red\">", "fixed": "<div className=\"error\">"},
                    {"rule": "no_inline_styles", "before": "<span style=\"x\">", "after": "<span className=\"y\">"},
                    {"rule": "prefer_const", "severity": "low"},
                    {"message": "no rule field"}
                ]),
                "quality",
                SetOptions::session(),
            )
            .unwrap();
        cache
            .set(
                "implementation:patch",
                &json!({"files_modified": ["src/theme.css", "src/Toggle.tsx"]}),
                "implementation",
                SetOptions::session(),
            )
            .unwrap();
        cache
            .set(
                "implementation:patch:followup",
                &json!({"filesModified": ["src/Toggle.tsx", "src/App.tsx"]}),
                "implementation",
                SetOptions::session(),
            )
            .unwrap();
        cache
    }

    fn required() -> Vec<String> {
        vec!["standards_gate".into(), "test_gate".into()]
    }

    #[test]
    fn test_decisions_from_planning() {
        let learnings = LearningExtractor::new(required())
            .extract(&populated_cache(), &report(RunStatus::Completed, vec![]));

        assert_eq!(learnings.decisions.len(), 2);
        assert_eq!(learnings.decisions[0].decision, "Use CSS variables for theming");
        assert_eq!(learnings.decisions[1].reasoning, "No backend needed");
        assert_eq!(learnings.decisions[1].context.as_deref(), Some("toggle"));
    }

    #[test]
    fn test_decisions_only_from_planning_phase() {
        let cache = SessionCache::new(Domain::Web, &CacheConfig::default());
        cache
            .set(
                "analysis:notes",
                &json!({"architecturalDecisions": ["not a planning output"]}),
                "analysis",
                SetOptions::session(),
            )
            .unwrap();
        let learnings =
            LearningExtractor::new(vec![]).extract(&cache, &report(RunStatus::Completed, vec![]));
        assert!(learnings.decisions.is_empty());
    }

    #[test]
    fn test_standards_one_per_distinct_rule() {
        let learnings = LearningExtractor::new(required())
            .extract(&populated_cache(), &report(RunStatus::Completed, vec![]));

        assert_eq!(learnings.standards.len(), 2);
        let inline = &learnings.standards[0];
        assert_eq!(inline.rule, "no_inline_styles");
        assert_eq!(inline.category, "styling");
        assert_eq!(inline.enforcement_level, EnforcementLevel::Required);
        assert_eq!(inline.examples.len(), 2);
        assert_eq!(
            inline.examples[1].fixed.as_deref(),
            Some("<span className=\"y\">")
        );

        let prefer = &learnings.standards[1];
        assert_eq!(prefer.category, "quality");
        assert_eq!(prefer.enforcement_level, EnforcementLevel::Advisory);
        assert!(prefer.examples.is_empty());
    }

    #[test]
    fn test_task_outcome_requires_all_gates() {
        let extractor = LearningExtractor::new(required());
        let cache = populated_cache();

        let ok = extractor.extract(
            &cache,
            &report(
                RunStatus::Completed,
                vec![GateResult::pass("standards_gate"), GateResult::pass("test_gate")],
            ),
        );
        assert_eq!(ok.task.outcome, Outcome::Success);
        assert_eq!(
            ok.task.files_modified,
            vec!["src/theme.css", "src/Toggle.tsx", "src/App.tsx"]
        );
        assert_eq!(ok.task.task_description, "add a dark mode toggle");

        let missing_gate = extractor.extract(
            &cache,
            &report(RunStatus::Completed, vec![GateResult::pass("standards_gate")]),
        );
        assert_eq!(missing_gate.task.outcome, Outcome::Failure);

        let failed_gate = extractor.extract(
            &cache,
            &report(
                RunStatus::Completed,
                vec![GateResult::pass("standards_gate"), GateResult::fail("test_gate")],
            ),
        );
        assert_eq!(failed_gate.task.outcome, Outcome::Failure);
        assert!(failed_gate.task.learnings.contains(&"gate failed: test_gate".to_string()));
    }

    #[test]
    fn test_event_records_phases_and_gates() {
        let learnings = LearningExtractor::new(required()).extract(
            &populated_cache(),
            &report(
                RunStatus::Completed,
                vec![GateResult::pass("standards_gate"), GateResult::fail("test_gate")],
            ),
        );
        let data = &learnings.event.data;
        assert_eq!(learnings.event.kind, "pipeline_execution");
        assert_eq!(data["phases_run"], json!(["analysis", "planning", "implementation"]));
        assert_eq!(data["gates_passed"], json!(["standards_gate"]));
        assert_eq!(data["gates_failed"], json!(["test_gate"]));
        assert_eq!(data["outcome"], "failure");
    }

    #[test]
    fn test_persist_counts_and_idempotent_standards() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let extractor = LearningExtractor::new(required());
        let learnings =
            extractor.extract(&populated_cache(), &report(RunStatus::Completed, vec![]));

        let first = extractor.persist(&learnings, &store, &AlwaysPersist);
        assert!(first.is_clean());
        assert_eq!(first.decisions, 2);
        assert_eq!(first.standards_inserted, 2);
        assert_eq!(first.task_history, 1);
        assert_eq!(first.events, 1);

        let second = extractor.persist(&learnings, &store, &AlwaysPersist);
        assert_eq!(second.standards_inserted, 0);
        assert_eq!(second.standards_known, 2);

        let stats = store.stats().unwrap();
        assert_eq!(stats.standard_count, 2);
        // Append-only kinds duplicate when extraction runs twice.
        assert_eq!(stats.decision_count, 4);
        assert_eq!(stats.task_count, 2);
    }

    #[test]
    fn test_policy_declines_standards() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let extractor = LearningExtractor::new(required());
        let report = extractor.extract_and_persist(
            &populated_cache(),
            &report(RunStatus::Completed, vec![]),
            &store,
            &NeverPersist,
        );
        assert_eq!(report.standards_declined, 2);
        assert_eq!(store.stats().unwrap().standard_count, 0);
        assert_eq!(store.stats().unwrap().task_count, 1);
    }
}
