//! Job domain model

use crate::core::{
    config::{render_map, JobConfig},
    state::{JobState, StepState},
    step::{Step, StepKind},
};
use anyhow::{Context, Result};
use std::collections::BTreeMap;

/// Job deadline when `timeout-minutes` is not set
pub const DEFAULT_JOB_TIMEOUT_MINUTES: u64 = 360;

/// Upper bound accepted for `timeout-minutes` (one week)
pub const MAX_TIMEOUT_MINUTES: u64 = 7 * 24 * 60;

/// A named unit of work bound to a runner label
#[derive(Debug, Clone)]
pub struct Job {
    /// Job id (key in the `jobs` map)
    pub id: String,

    /// Display name
    pub name: String,

    /// Runner labels, all of which the host must accept
    pub runner: Vec<String>,

    /// Jobs that must succeed first
    pub needs: Vec<String>,

    /// Job bindings (override workflow ones)
    pub env: BTreeMap<String, String>,

    /// Job deadline in seconds
    pub timeout_secs: u64,

    /// Steps in declared order
    pub steps: Vec<Step>,

    /// Runtime state
    pub state: JobState,
}

impl Job {
    /// Create a job from its config entry
    pub fn from_config(id: &str, config: &JobConfig) -> Result<Self> {
        let steps = config
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| Step::from_config(index, step))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Invalid step in job '{}'", id))?;

        Ok(Job {
            id: id.to_string(),
            name: config.name.clone().unwrap_or_else(|| id.to_string()),
            runner: config.runs_on.clone(),
            needs: config.needs.clone(),
            env: render_map(&config.env),
            timeout_secs: config
                .timeout_minutes
                .unwrap_or(DEFAULT_JOB_TIMEOUT_MINUTES)
                .saturating_mul(60),
            steps,
            state: JobState::Pending,
        })
    }

    /// Primary runner label
    pub fn runner_label(&self) -> &str {
        self.runner.first().map(String::as_str).unwrap_or_default()
    }

    /// Steps of the given kind in declared order
    pub fn steps_of_kind(&self, kind: StepKind) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |s| s.kind == kind)
    }

    /// Whether `needs` are all satisfied by the given completed set
    pub fn dependencies_met(&self, succeeded: &[&str]) -> bool {
        self.needs.iter().all(|dep| succeeded.contains(&dep.as_str()))
    }

    /// Mark every pending step as skipped
    pub fn skip_remaining(&mut self, reason: &str) {
        for step in &mut self.steps {
            if matches!(step.state, StepState::Pending) {
                step.state = StepState::Skipped {
                    reason: reason.to_string(),
                };
            }
        }
    }

    /// Counts of (succeeded, degraded, failed, skipped) steps
    pub fn step_counts(&self) -> (usize, usize, usize, usize) {
        self.steps.iter().fold((0, 0, 0, 0), |(ok, deg, failed, skipped), step| {
            match step.state {
                StepState::Completed { .. } => (ok + 1, deg, failed, skipped),
                StepState::Degraded { .. } => (ok, deg + 1, failed, skipped),
                StepState::Failed { .. } => (ok, deg, failed + 1, skipped),
                StepState::Skipped { .. } => (ok, deg, failed, skipped + 1),
                _ => (ok, deg, failed, skipped),
            }
        })
    }
}
