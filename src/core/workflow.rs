//! Workflow domain model

use crate::core::{
    config::WorkflowConfig,
    job::Job,
    state::{ExecutionStatus, JobState, RunState},
    step::StepAction,
    trigger::Triggers,
};
use anyhow::Result;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

/// A runnable workflow definition
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Workflow name
    pub name: String,

    /// Compiled `on:` rules
    pub triggers: Triggers,

    /// Workflow-wide bindings
    pub env: BTreeMap<String, String>,

    /// Jobs keyed by id
    pub jobs: BTreeMap<String, Job>,

    /// Execution state
    pub state: RunState,

    /// Job execution order (topological sort)
    job_order: Vec<String>,
}

impl Workflow {
    /// Create a workflow from configuration
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        let jobs = config
            .jobs
            .iter()
            .map(|(id, job)| Job::from_config(id, job).map(|job| (id.clone(), job)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let job_order = Self::topological_sort(&jobs);

        Ok(Workflow {
            name: config.name.clone(),
            triggers: Triggers::from_config(&config.on)?,
            env: config.env_as_string_map(),
            jobs,
            state: RunState::new(),
            job_order,
        })
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn job_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    /// Pending jobs whose dependencies all succeeded, in execution order
    pub fn ready_jobs(&self) -> Vec<&Job> {
        let succeeded: Vec<&str> = self
            .jobs
            .values()
            .filter(|j| j.state.succeeded())
            .map(|j| j.id.as_str())
            .collect();

        self.job_order
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .filter(|j| matches!(j.state, JobState::Pending) && j.dependencies_met(&succeeded))
            .collect()
    }

    /// Pending jobs with a dependency that failed or was skipped
    pub fn blocked_jobs(&self) -> Vec<&Job> {
        self.job_order
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .filter(|j| matches!(j.state, JobState::Pending))
            .filter(|j| {
                j.needs.iter().any(|dep| {
                    self.jobs
                        .get(dep)
                        .map(|d| d.state.is_terminal() && !d.state.succeeded())
                        .unwrap_or(true)
                })
            })
            .collect()
    }

    pub fn running_jobs(&self) -> Vec<&Job> {
        self.jobs
            .values()
            .filter(|j| matches!(j.state, JobState::Running { .. }))
            .collect()
    }

    /// Every job reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.jobs.values().all(|j| j.state.is_terminal())
    }

    pub fn has_failed(&self) -> bool {
        self.state.status == ExecutionStatus::Failed
    }

    /// Refresh the run counters from job states
    pub fn refresh_counts(&mut self) {
        let (mut completed, mut failed, mut skipped, mut running) = (0, 0, 0, 0);
        for job in self.jobs.values() {
            match job.state {
                JobState::Completed { .. } => completed += 1,
                JobState::Failed { .. } => failed += 1,
                JobState::Skipped { .. } => skipped += 1,
                JobState::Running { .. } => running += 1,
                JobState::Pending => {}
            }
        }
        self.state.update_counts(completed, failed, skipped, running);
    }

    /// Get execution order (topological sort)
    pub fn job_order(&self) -> &[String] {
        &self.job_order
    }

    /// SHA-256 over the ordered job ids and their step labels
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for id in &self.job_order {
            let Some(job) = self.jobs.get(id) else {
                continue;
            };
            hasher.update(id.as_bytes());
            hasher.update(b"\0");
            for step in &job.steps {
                let label = match &step.action {
                    StepAction::Uses { action, .. } => action.to_string(),
                    StepAction::Run { command, .. } => command.clone(),
                };
                hasher.update(step.kind.label().as_bytes());
                hasher.update(b":");
                hasher.update(label.as_bytes());
                hasher.update(b"\0");
            }
        }
        hex::encode(hasher.finalize())
    }

    fn topological_sort(jobs: &BTreeMap<String, Job>) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut temp_visited = HashSet::new();

        // BTreeMap keys are already sorted, so the order is deterministic
        for job_id in jobs.keys() {
            if !visited.contains(job_id) {
                Self::visit(job_id, jobs, &mut visited, &mut temp_visited, &mut result);
            }
        }

        result
    }

    fn visit(
        job_id: &str,
        jobs: &BTreeMap<String, Job>,
        visited: &mut HashSet<String>,
        temp_visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if visited.contains(job_id) || temp_visited.contains(job_id) {
            return;
        }

        temp_visited.insert(job_id.to_string());

        if let Some(job) = jobs.get(job_id) {
            for dep in &job.needs {
                Self::visit(dep, jobs, visited, temp_visited, result);
            }
        }

        temp_visited.remove(job_id);
        visited.insert(job_id.to_string());
        result.push(job_id.to_string());
    }
}
