//! Append-only trajectory of phase-level steps recorded during one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Phase a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Assessment,
    Synthesis,
    Validation,
    Testing,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Assessment => "assessment",
            Self::Synthesis => "synthesis",
            Self::Validation => "validation",
            Self::Testing => "testing",
        };
        f.write_str(s)
    }
}

/// One recorded phase outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStep {
    pub iteration: u32,
    pub step_type: StepType,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub inputs: Value,
    pub outputs: Value,
    pub success: bool,
    pub error: Option<String>,
}

/// Ordered step log. Steps can be appended, never edited or removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    steps: Vec<TrajectoryStep>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: TrajectoryStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[TrajectoryStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn into_steps(self) -> Vec<TrajectoryStep> {
        self.steps
    }

    /// `true` when the two most recent steps both failed.
    pub fn last_two_failed(&self) -> bool {
        self.steps.len() >= 2 && self.steps[self.steps.len() - 2..].iter().all(|s| !s.success)
    }

    /// Natural-language digest of recent steps, folded into prompts so the
    /// generator can react to earlier failures.
    pub fn digest(&self) -> String {
        if self.steps.is_empty() {
            return "No previous attempts to analyze.".to_string();
        }

        let start = self.steps.len().saturating_sub(3);
        let failures: Vec<&TrajectoryStep> =
            self.steps[start..].iter().filter(|s| !s.success).collect();

        match failures.as_slice() {
            [] => "Previous steps succeeded; no corrective context.".to_string(),
            [only] => format!(
                "Previous attempt (iteration {}) failed during {}: {}",
                only.iteration,
                only.step_type,
                only.error.as_deref().unwrap_or("unknown error")
            ),
            many => {
                let errors: Vec<String> = many
                    .iter()
                    .map(|s| format!("{}: {}", s.step_type, s.error.as_deref().unwrap_or("unknown error")))
                    .collect();
                format!(
                    "Multiple recent failures detected. Last errors: [{}]",
                    errors.join("; ")
                )
            }
        }
    }

    /// Short digest: pass/fail counts plus the most recent error.
    pub fn summary(&self) -> String {
        if self.steps.is_empty() {
            return "No trajectory recorded".to_string();
        }

        let total = self.steps.len();
        let passed = self.steps.iter().filter(|s| s.success).count();
        let failed = total - passed;
        let mut summary = format!("Trajectory: {total} steps, {passed} successful, {failed} failed");

        if let Some(err) = self.steps.iter().rev().find_map(|s| s.error.as_deref()) {
            summary.push_str(&format!(". Most recent error: {err}"));
        }
        summary
    }
}
