//! Job context - environment bindings and scratch space for one job

use crate::core::{step::Step, trigger::RepositoryEvent};
use crate::settings::{CheckoutMode, RunnerSettings};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

const ENV_FILE: &str = "env";
const PATH_FILE: &str = "path";

/// Execution context of a single job
///
/// Each job gets its own context. Nothing in here is shared with other jobs
/// or other runs; the scratch directory is removed when the context drops.
#[derive(Debug)]
pub struct JobContext {
    pub run_id: Uuid,
    pub job_id: String,
    pub runner_label: String,
    pub event: RepositoryEvent,

    /// Directory steps run in
    pub workspace: PathBuf,

    pub checkout: CheckoutMode,

    /// Job binding: workflow env, job env, overrides, then step exports
    pub env: BTreeMap<String, String>,

    /// Directories prepended to `PATH`, most recent first
    pub path_prefix: Vec<String>,

    /// `RUSTC_WRAPPER` is withheld from every later step
    pub wrapper_disabled: bool,

    /// Host environment steps inherit
    base: HashMap<String, String>,

    scratch: TempDir,
}

impl JobContext {
    /// Provision a clean context for a job
    pub fn provision(
        run_id: Uuid,
        job_id: &str,
        runner_label: &str,
        event: &RepositoryEvent,
        settings: &RunnerSettings,
    ) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix(&format!("cirun-{}-", job_id))
            .tempdir()
            .context("Failed to create job scratch directory")?;

        let workspace = match &settings.checkout {
            CheckoutMode::InPlace => settings.workspace.clone(),
            CheckoutMode::Clone { .. } => {
                let workspace = scratch.path().join("workspace");
                std::fs::create_dir_all(&workspace)
                    .with_context(|| format!("Failed to create workspace {}", workspace.display()))?;
                workspace
            }
        };

        debug!(
            job = job_id,
            workspace = %workspace.display(),
            scratch = %scratch.path().display(),
            "provisioned job context"
        );

        Ok(Self {
            run_id,
            job_id: job_id.to_string(),
            runner_label: runner_label.to_string(),
            event: event.clone(),
            workspace,
            checkout: settings.checkout.clone(),
            env: BTreeMap::new(),
            path_prefix: Vec::new(),
            wrapper_disabled: false,
            base: std::env::vars().collect(),
            scratch,
        })
    }

    /// Replace the inherited host environment
    pub fn with_base_env(mut self, base: HashMap<String, String>) -> Self {
        self.base = base;
        self
    }

    /// Layer bindings onto the job binding, later layers win
    pub fn bind<'a, I>(&mut self, layer: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in layer {
            self.env.insert(key.clone(), value.clone());
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// File steps append `KEY=VALUE` bindings to
    pub fn env_file(&self) -> PathBuf {
        self.scratch.path().join(ENV_FILE)
    }

    /// File steps append `PATH` entries to
    pub fn path_file(&self) -> PathBuf {
        self.scratch.path().join(PATH_FILE)
    }

    /// Effective environment for a step
    ///
    /// Host env, then runner variables, then the job binding, then the step's
    /// own `env`.
    pub fn step_environment(&self, step: &Step) -> HashMap<String, String> {
        let mut env = self.base.clone();

        env.insert("CI".to_string(), "true".to_string());
        env.insert("CIRUN".to_string(), "true".to_string());
        env.insert("CIRUN_WORKSPACE".to_string(), self.workspace.display().to_string());
        env.insert("CIRUN_RUN_ID".to_string(), self.run_id.to_string());
        env.insert("CIRUN_JOB".to_string(), self.job_id.clone());
        env.insert("CIRUN_EVENT_NAME".to_string(), self.event.kind.to_string());
        env.insert("CIRUN_REF".to_string(), self.event.git_ref.to_string());
        env.insert("CIRUN_RUNNER".to_string(), self.runner_label.clone());
        env.insert("CIRUN_ENV".to_string(), self.env_file().display().to_string());
        env.insert("CIRUN_PATH".to_string(), self.path_file().display().to_string());
        match &self.event.sha {
            Some(sha) => {
                env.insert("CIRUN_SHA".to_string(), sha.clone());
            }
            None => {
                env.remove("CIRUN_SHA");
            }
        }

        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.extend(self.effective_step_env(step, &env));

        if !self.path_prefix.is_empty() {
            let mut path = self.path_prefix.join(":");
            if let Some(existing) = env.get("PATH").filter(|p| !p.is_empty()) {
                path.push(':');
                path.push_str(existing);
            }
            env.insert("PATH".to_string(), path);
        }

        if self.wrapper_disabled {
            env.remove("RUSTC_WRAPPER");
        }

        env
    }

    // Step env values may reference the job binding
    fn effective_step_env(
        &self,
        step: &Step,
        job_env: &HashMap<String, String>,
    ) -> Vec<(String, String)> {
        step.env
            .iter()
            .map(|(k, v)| (k.clone(), crate::core::step::substitute_env(v, job_env)))
            .collect()
    }

    /// Add bindings exported by a step; visible to later steps only
    pub fn apply_exports(&mut self, exports: &BTreeMap<String, String>) {
        for (key, value) in exports {
            debug!(job = %self.job_id, key = %key, "binding exported");
            self.env.insert(key.clone(), value.clone());
        }
    }

    pub fn prepend_path(&mut self, entries: &[String]) {
        for entry in entries {
            if !self.path_prefix.contains(entry) {
                self.path_prefix.insert(0, entry.clone());
            }
        }
    }

    /// Truncate the command files before a step runs
    pub fn reset_command_files(&self) -> Result<()> {
        for file in [self.env_file(), self.path_file()] {
            std::fs::write(&file, b"")
                .with_context(|| format!("Failed to reset {}", file.display()))?;
        }
        Ok(())
    }

    /// Read what the last step wrote to the command files
    pub fn read_command_files(&self) -> Result<(BTreeMap<String, String>, Vec<String>)> {
        let env = read_optional(&self.env_file())?;
        let path = read_optional(&self.path_file())?;
        Ok((parse_env_file(&env)?, parse_path_file(&path)))
    }

    /// Drop a `RUSTC_WRAPPER` binding accepted by `points_at`
    pub fn remove_wrapper_binding(&mut self, points_at: impl Fn(&str) -> bool) -> bool {
        let bound = self
            .env
            .get("RUSTC_WRAPPER")
            .map(|v| points_at(v))
            .unwrap_or(false);
        if bound {
            self.env.remove("RUSTC_WRAPPER");
        }
        let inherited = self
            .base
            .get("RUSTC_WRAPPER")
            .map(|v| points_at(v))
            .unwrap_or(false);
        if inherited {
            self.base.remove("RUSTC_WRAPPER");
        }
        bound || inherited
    }

    /// Withhold `RUSTC_WRAPPER` from all remaining steps
    pub fn disable_wrapper(&mut self) {
        self.wrapper_disabled = true;
        self.env.remove("RUSTC_WRAPPER");
    }
}

fn read_optional(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Parse `KEY=VALUE` lines and `KEY<<DELIM` heredoc blocks
pub fn parse_env_file(content: &str) -> Result<BTreeMap<String, String>> {
    let mut bindings = BTreeMap::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        if line.trim().is_empty() {
            continue;
        }

        if let Some((key, delimiter)) = heredoc_header(line) {
            let key = key.trim();
            let delimiter = delimiter.trim();
            if key.is_empty() || delimiter.is_empty() {
                anyhow::bail!("Malformed heredoc binding '{}'", line);
            }
            let mut value = Vec::new();
            let mut terminated = false;
            for body in lines.by_ref() {
                if body == delimiter {
                    terminated = true;
                    break;
                }
                value.push(body);
            }
            if !terminated {
                anyhow::bail!("Binding '{}' is missing its closing delimiter '{}'", key, delimiter);
            }
            bindings.insert(key.to_string(), value.join("\n"));
        } else if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                anyhow::bail!("Binding with empty name: '{}'", line);
            }
            bindings.insert(key.to_string(), value.to_string());
        } else {
            anyhow::bail!("Malformed binding '{}' (expected KEY=VALUE)", line);
        }
    }

    Ok(bindings)
}

/// `KEY<<DELIM`, unless an `=` comes first and the line is a plain binding
fn heredoc_header(line: &str) -> Option<(&str, &str)> {
    let marker = line.find("<<")?;
    match line.find('=') {
        Some(eq) if eq < marker => None,
        _ => Some((&line[..marker], &line[marker + 2..])),
    }
}

/// One directory per non-empty line, in file order
pub fn parse_path_file(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
