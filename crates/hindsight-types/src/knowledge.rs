//! Knowledge records persisted across pipeline runs.
//!
//! Four kinds exist. [`Standard`] is deduplicated on `(domain, rule)`; the
//! other three are append-only.

use serde::{Deserialize, Serialize};

use crate::{Domain, Timestamp, now};

/// Well-known event kinds.
pub mod event_kinds {
    /// One per session: phases run and gate outcomes.
    pub const PIPELINE_EXECUTION: &str = "pipeline_execution";
}

/// An architectural or implementation decision made during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub domain: Domain,
    pub decision: String,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub context: Option<String>,
    pub created_at: Timestamp,
}

impl Decision {
    pub fn new(domain: Domain, decision: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            domain,
            decision: decision.into(),
            reasoning: reasoning.into(),
            context: None,
            created_at: now(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// How strictly a standard is enforced by quality gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementLevel {
    /// Violations fail the gate.
    Required,
    /// Violations are reported but do not fail the gate.
    Recommended,
    /// Informational only.
    Advisory,
}

impl EnforcementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementLevel::Required => "required",
            EnforcementLevel::Recommended => "recommended",
            EnforcementLevel::Advisory => "advisory",
        }
    }

    /// Parse a stored level. Unknown values degrade to `Advisory`.
    pub fn parse(s: &str) -> Self {
        match s {
            "required" => EnforcementLevel::Required,
            "recommended" => EnforcementLevel::Recommended,
            _ => EnforcementLevel::Advisory,
        }
    }

    /// Map a violation severity label onto an enforcement level.
    pub fn from_severity(severity: &str) -> Self {
        match severity.trim().to_ascii_lowercase().as_str() {
            "critical" | "high" | "error" => EnforcementLevel::Required,
            "medium" | "warning" => EnforcementLevel::Recommended,
            _ => EnforcementLevel::Advisory,
        }
    }
}

/// An offending/fixed snippet pair illustrating a standard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardExample {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub offending: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fixed: Option<String>,
}

/// A learned rule, auto-enforced in future runs.
///
/// Unique on `(domain, rule)`. Re-deriving an existing rule is a no-op: the
/// first stored record wins, including its rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standard {
    pub domain: Domain,
    pub category: String,
    pub rule: String,
    pub rationale: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub examples: Vec<StandardExample>,
    pub enforcement_level: EnforcementLevel,
    pub created_at: Timestamp,
}

impl Standard {
    pub fn new(
        domain: Domain,
        category: impl Into<String>,
        rule: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            category: category.into(),
            rule: rule.into(),
            rationale: rationale.into(),
            examples: Vec::new(),
            enforcement_level: EnforcementLevel::Recommended,
            created_at: now(),
        }
    }

    pub fn with_example(mut self, example: StandardExample) -> Self {
        self.examples.push(example);
        self
    }

    pub fn with_enforcement(mut self, level: EnforcementLevel) -> Self {
        self.enforcement_level = level;
        self
    }
}

/// Overall outcome of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Outcome::Success),
            "failure" => Some(Outcome::Failure),
            _ => None,
        }
    }
}

/// Summary of one past pipeline run, used for similar-task lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHistoryEntry {
    pub domain: Domain,
    pub task_description: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub learnings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub files_modified: Vec<String>,
    pub created_at: Timestamp,
}

impl TaskHistoryEntry {
    pub fn new(domain: Domain, task_description: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            domain,
            task_description: task_description.into(),
            outcome,
            learnings: Vec::new(),
            files_modified: Vec::new(),
            created_at: now(),
        }
    }

    pub fn with_learnings(mut self, learnings: Vec<String>) -> Self {
        self.learnings = learnings;
        self
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files_modified = files;
        self
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub domain: Domain,
    pub data: serde_json::Value,
    pub created_at: Timestamp,
}

impl Event {
    pub fn new(kind: impl Into<String>, domain: Domain, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            domain,
            data,
            created_at: now(),
        }
    }

    /// The per-session execution summary event.
    pub fn pipeline_execution(domain: Domain, data: serde_json::Value) -> Self {
        Self::new(event_kinds::PIPELINE_EXECUTION, domain, data)
    }
}
