//! Quality gate results reported by pipeline phases.

use serde::{Deserialize, Serialize};

/// Outcome of a single quality gate evaluated during a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    /// Gate name, e.g. `standards_gate`.
    pub gate: String,
    /// Whether the gate passed.
    pub passed: bool,
    /// Optional numeric score.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub score: Option<u32>,
    /// Short violation descriptions for failed gates.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub violations: Vec<String>,
}

impl GateResult {
    /// A passing gate.
    pub fn pass(gate: impl Into<String>) -> Self {
        Self {
            gate: gate.into(),
            passed: true,
            score: None,
            violations: Vec::new(),
        }
    }

    /// A failing gate.
    pub fn fail(gate: impl Into<String>) -> Self {
        Self {
            gate: gate.into(),
            passed: false,
            score: None,
            violations: Vec::new(),
        }
    }

    pub fn with_score(mut self, score: u32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_violation(mut self, violation: impl Into<String>) -> Self {
        self.violations.push(violation.into());
        self
    }
}
