//! Workflow configuration from YAML

use crate::core::{
    condition::StepCondition,
    job::MAX_TIMEOUT_MINUTES,
    step::ActionRef,
    trigger::Triggers,
    workflow::Workflow,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Top-level workflow definition loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name
    #[serde(default = "default_workflow_name")]
    pub name: String,

    /// Events that activate the workflow
    #[serde(rename = "on")]
    pub on: OnConfig,

    /// Bindings visible to every job
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Jobs keyed by id
    pub jobs: BTreeMap<String, JobConfig>,
}

fn default_workflow_name() -> String {
    "workflow".to_string()
}

/// The `on:` section: a single event, a list of events, or per-event filters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OnConfig {
    Event(String),
    Events(Vec<String>),
    Filters(EventFilters),
}

/// Per-event filter map
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilters {
    /// `Some(None)` when the key is present without filters
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub push: Option<Option<BranchFilterConfig>>,

    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<Option<BranchFilterConfig>>,

    /// Events this runner does not support; rejected during validation
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// Branch filter for one event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchFilterConfig {
    #[serde(default)]
    pub branches: Option<Vec<String>>,

    #[serde(default, rename = "branches-ignore")]
    pub branches_ignore: Option<Vec<String>>,

    /// Filters this runner does not support (paths, tags, ...)
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Human-readable job name
    #[serde(default)]
    pub name: Option<String>,

    /// Runner label(s) the job must run on
    #[serde(rename = "runs-on", deserialize_with = "one_or_many")]
    pub runs_on: Vec<String>,

    /// Jobs that must succeed first
    #[serde(default, deserialize_with = "one_or_many")]
    pub needs: Vec<String>,

    /// Bindings visible to this job only, overriding workflow ones
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Job deadline in minutes
    #[serde(default, rename = "timeout-minutes")]
    pub timeout_minutes: Option<u64>,

    /// Ordered steps
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    /// Reusable action reference (`owner/repo@ref`)
    #[serde(default)]
    pub uses: Option<String>,

    /// Action inputs
    #[serde(default)]
    pub with: BTreeMap<String, Value>,

    /// Inline command
    #[serde(default)]
    pub run: Option<String>,

    #[serde(default)]
    pub shell: Option<String>,

    #[serde(default, rename = "working-directory")]
    pub working_directory: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Run condition (`success()`, `always()`, `failure()`)
    #[serde(default, rename = "if")]
    pub condition: Option<String>,

    #[serde(default, rename = "continue-on-error")]
    pub continue_on_error: bool,

    #[serde(default, rename = "timeout-minutes")]
    pub timeout_minutes: Option<u64>,
}

fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

/// Render a YAML scalar as an environment value
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Render a YAML map of bindings as strings
pub fn render_map(values: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    values
        .iter()
        .map(|(k, v)| (k.clone(), render_value(v)))
        .collect()
}

impl WorkflowConfig {
    /// Load a workflow from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid workflow file {}", path.display()))
    }

    /// Parse a workflow from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the workflow definition
    pub fn validate(&self) -> Result<()> {
        Triggers::from_config(&self.on).context("Invalid 'on' section")?;
        validate_env_keys("workflow", &self.env)?;

        if self.jobs.is_empty() {
            anyhow::bail!("Workflow '{}' defines no jobs", self.name);
        }

        for (job_id, job) in &self.jobs {
            if job_id.trim().is_empty() {
                anyhow::bail!("Job ids must not be empty");
            }
            if job.runs_on.is_empty() || job.runs_on.iter().any(|l| l.trim().is_empty()) {
                anyhow::bail!("Job '{}' has no 'runs-on' label", job_id);
            }
            if job.steps.is_empty() {
                anyhow::bail!("Job '{}' has no steps", job_id);
            }
            validate_timeout(&format!("Job '{}'", job_id), job.timeout_minutes)?;
            validate_env_keys(&format!("job '{}'", job_id), &job.env)?;

            for dep in &job.needs {
                if dep == job_id {
                    anyhow::bail!("Job '{}' needs itself", job_id);
                }
                if !self.jobs.contains_key(dep) {
                    anyhow::bail!("Job '{}' needs non-existent job '{}'", job_id, dep);
                }
            }

            let mut step_ids = HashSet::new();
            for (index, step) in job.steps.iter().enumerate() {
                let label = step
                    .name
                    .clone()
                    .or_else(|| step.id.clone())
                    .unwrap_or_else(|| format!("#{}", index + 1));
                validate_step(job_id, &label, step)?;

                if let Some(id) = &step.id {
                    if !step_ids.insert(id.clone()) {
                        anyhow::bail!("Job '{}' has duplicate step id '{}'", job_id, id);
                    }
                }
            }
        }

        self.check_cycles()?;

        Ok(())
    }

    /// Check for cycles in the `needs` graph
    fn check_cycles(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut recursion_stack = HashSet::new();

        for job_id in self.jobs.keys() {
            if !visited.contains(job_id) {
                self.dfs_check(job_id, &mut visited, &mut recursion_stack)?;
            }
        }

        Ok(())
    }

    fn dfs_check(
        &self,
        job_id: &str,
        visited: &mut HashSet<String>,
        recursion_stack: &mut HashSet<String>,
    ) -> Result<()> {
        visited.insert(job_id.to_string());
        recursion_stack.insert(job_id.to_string());

        if let Some(job) = self.jobs.get(job_id) {
            for dep in &job.needs {
                if recursion_stack.contains(dep) {
                    anyhow::bail!("Cycle detected in job dependencies involving '{}'", dep);
                }
                if !visited.contains(dep) {
                    self.dfs_check(dep, visited, recursion_stack)?;
                }
            }
        }

        recursion_stack.remove(job_id);
        Ok(())
    }

    /// Workflow-level bindings as strings
    pub fn env_as_string_map(&self) -> BTreeMap<String, String> {
        render_map(&self.env)
    }

    /// Total number of steps across all jobs
    pub fn step_count(&self) -> usize {
        self.jobs.values().map(|j| j.steps.len()).sum()
    }

    /// Convert the config into a runnable workflow
    pub fn to_workflow(&self) -> Result<Workflow> {
        Workflow::from_config(self)
    }
}

fn validate_step(job_id: &str, label: &str, step: &StepConfig) -> Result<()> {
    match (&step.uses, &step.run) {
        (Some(_), Some(_)) => {
            anyhow::bail!("Step '{}' in job '{}' sets both 'uses' and 'run'", label, job_id)
        }
        (None, None) => {
            anyhow::bail!("Step '{}' in job '{}' needs either 'uses' or 'run'", label, job_id)
        }
        (Some(uses), None) => {
            uses.parse::<ActionRef>()
                .with_context(|| format!("Step '{}' in job '{}'", label, job_id))?;
            if step.shell.is_some() || step.working_directory.is_some() {
                anyhow::bail!(
                    "Step '{}' in job '{}': 'shell' and 'working-directory' only apply to 'run' steps",
                    label,
                    job_id
                );
            }
        }
        (None, Some(run)) => {
            if run.trim().is_empty() {
                anyhow::bail!("Step '{}' in job '{}' has an empty 'run' command", label, job_id);
            }
            if !step.with.is_empty() {
                anyhow::bail!(
                    "Step '{}' in job '{}': 'with' only applies to 'uses' steps",
                    label,
                    job_id
                );
            }
        }
    }

    if let Some(condition) = &step.condition {
        condition
            .parse::<StepCondition>()
            .with_context(|| format!("Step '{}' in job '{}'", label, job_id))?;
    }
    validate_timeout(
        &format!("Step '{}' in job '{}'", label, job_id),
        step.timeout_minutes,
    )?;

    validate_env_keys(&format!("step '{}' in job '{}'", label, job_id), &step.env)
}

fn validate_timeout(owner: &str, minutes: Option<u64>) -> Result<()> {
    match minutes {
        Some(0) => anyhow::bail!("{} has a zero timeout", owner),
        Some(m) if m > MAX_TIMEOUT_MINUTES => anyhow::bail!(
            "{} has a timeout of {} minutes (maximum is {})",
            owner,
            m,
            MAX_TIMEOUT_MINUTES
        ),
        _ => Ok(()),
    }
}

fn validate_env_keys(scope: &str, env: &BTreeMap<String, Value>) -> Result<()> {
    for key in env.keys() {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            anyhow::bail!("Invalid environment variable name '{}' in {}", key, scope);
        }
    }
    Ok(())
}
