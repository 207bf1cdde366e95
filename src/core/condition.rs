//! Step run conditions

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// When a step runs relative to earlier failures in its job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepCondition {
    /// Only while no earlier step has failed
    #[default]
    Success,
    /// Regardless of earlier failures
    Always,
    /// Only after an earlier step failed
    Failure,
}

impl StepCondition {
    /// Decide whether the step runs given the job's failure state
    pub fn should_run(&self, job_failed: bool) -> bool {
        match self {
            StepCondition::Success => !job_failed,
            StepCondition::Always => true,
            StepCondition::Failure => job_failed,
        }
    }
}

impl FromStr for StepCondition {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> anyhow::Result<Self> {
        let mut expr = raw.trim();
        if let Some(inner) = expr.strip_prefix("${{").and_then(|e| e.strip_suffix("}}")) {
            expr = inner.trim();
        }

        match expr {
            "success()" => Ok(StepCondition::Success),
            // Runs are never cancelled here, so these behave like always()
            "always()" | "!cancelled()" => Ok(StepCondition::Always),
            "failure()" => Ok(StepCondition::Failure),
            _ => anyhow::bail!(
                "unsupported condition '{}' (expected success(), always() or failure())",
                raw.trim()
            ),
        }
    }
}
