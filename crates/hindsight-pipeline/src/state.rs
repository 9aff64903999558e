//! Session lifecycle, phase records and run reports.

use std::fmt;

use hindsight_types::{GateResult, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Lifecycle of one pipeline session.
///
/// ```text
/// fresh -> running -> {checkpointed -> running}* -> completed | failed
/// ```
///
/// A session resumed from a checkpoint starts in `Checkpointed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Fresh,
    Running,
    Checkpointed,
    Completed,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Fresh => "fresh",
            SessionState::Running => "running",
            SessionState::Checkpointed => "checkpointed",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Fresh, Running)
                | (Running, Checkpointed)
                | (Running, Completed)
                | (Running, Failed)
                | (Checkpointed, Running)
                | (Checkpointed, Completed)
                | (Checkpointed, Failed)
        )
    }

    /// Move to `next`, rejecting transitions the lifecycle forbids.
    pub fn transition(self, next: SessionState) -> Result<SessionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(PipelineError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `"{phase}:completed"` marker.
///
/// Gate results are kept so a resumed run still knows how skipped phases fared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: String,
    pub completed_at: Timestamp,
    #[serde(default)]
    pub gates: Vec<GateResult>,
}

/// Which phases a run would reuse and which it would execute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResumePlan {
    pub skipped: Vec<String>,
    pub to_run: Vec<String>,
}

impl ResumePlan {
    pub fn is_resume(&self) -> bool {
        !self.skipped.is_empty()
    }
}

impl fmt::Display for ResumePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |phases: &[String]| {
            if phases.is_empty() {
                "none".to_string()
            } else {
                phases.join(", ")
            }
        };
        write!(
            f,
            "reusing: {}; executing: {}",
            list(&self.skipped),
            list(&self.to_run)
        )
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed { phase: String, message: String },
    Cancelled,
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed { .. } => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Summary of one driver run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub session_id: String,
    pub request: String,
    pub status: RunStatus,
    /// Phases executed in this run, in order.
    pub executed: Vec<String>,
    /// Phases skipped because a completion marker was present.
    pub skipped: Vec<String>,
    /// Gate results from executed and skipped phases.
    pub gates: Vec<GateResult>,
}

impl RunReport {
    /// Latest result per gate name, in first-seen order.
    pub fn latest_gates(&self) -> Vec<&GateResult> {
        let mut latest: Vec<&GateResult> = Vec::new();
        for gate in &self.gates {
            match latest.iter_mut().find(|g| g.gate == gate.gate) {
                Some(slot) => *slot = gate,
                None => latest.push(gate),
            }
        }
        latest
    }

    /// Whether every named gate has a passing latest result.
    /// A gate that never reported counts as not passed.
    pub fn gates_passed(&self, required: &[String]) -> bool {
        let latest = self.latest_gates();
        required
            .iter()
            .all(|name| latest.iter().any(|g| &g.gate == name && g.passed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let s = SessionState::Fresh;
        let s = s.transition(SessionState::Running).unwrap();
        let s = s.transition(SessionState::Checkpointed).unwrap();
        let s = s.transition(SessionState::Running).unwrap();
        let s = s.transition(SessionState::Completed).unwrap();
        assert!(s.is_terminal());

        assert!(SessionState::Completed.transition(SessionState::Running).is_err());
        assert!(SessionState::Fresh.transition(SessionState::Completed).is_err());
        assert!(SessionState::Failed.transition(SessionState::Checkpointed).is_err());
    }

    #[test]
    fn test_latest_gate_wins() {
        let report = RunReport {
            session_id: "s".into(),
            request: "r".into(),
            status: RunStatus::Completed,
            executed: vec![],
            skipped: vec![],
            gates: vec![
                GateResult::fail("test_gate"),
                GateResult::pass("standards_gate"),
                GateResult::pass("test_gate"),
            ],
        };
        let required = vec!["standards_gate".to_string(), "test_gate".to_string()];
        assert!(report.gates_passed(&required));
        assert_eq!(report.latest_gates().len(), 2);

        let missing = vec!["security_gate".to_string()];
        assert!(!report.gates_passed(&missing));
        assert!(report.gates_passed(&[]));
    }

    #[test]
    fn test_plan_display() {
        let plan = ResumePlan {
            skipped: vec!["analysis".into(), "planning".into()],
            to_run: vec!["implementation".into()],
        };
        assert!(plan.is_resume());
        assert_eq!(
            plan.to_string(),
            "reusing: analysis, planning; executing: implementation"
        );
    }

    #[test]
    fn test_run_status_serialization() {
        let status = RunStatus::Failed {
            phase: "quality".into(),
            message: "tests failed".into(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["phase"], "quality");
    }
}
