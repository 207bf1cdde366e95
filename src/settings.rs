//! Host runner settings
//!
//! Defaults, overridden by `CIRUN_*` environment variables, overridden by CLI
//! flags through the `with_*` builders.

use crate::cache::CacheConfig;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Shell used for `run` steps without an explicit `shell`
pub const DEFAULT_SHELL: &str = "bash --noprofile --norc -eo pipefail -c";

/// Runner labels accepted when `CIRUN_RUNNER_LABELS` is not set
pub const DEFAULT_RUNNER_LABELS: &[&str] = &[
    "ubuntu-latest",
    "ubuntu-24.04",
    "ubuntu-22.04",
    "linux",
    "self-hosted",
    "local",
];

/// How the checkout step populates the workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutMode {
    /// Use the source directory as the workspace
    InPlace,
    /// Clone the source into a fresh per-job workspace
    Clone { source: String },
}

/// Settings of the local host acting as a runner
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Default shell command line; the script is appended as the last argument
    pub shell: Vec<String>,

    /// Source directory of the project under test
    pub workspace: PathBuf,

    pub checkout: CheckoutMode,

    /// Labels this host accepts for `runs-on`
    pub runner_labels: Vec<String>,

    pub cache: CacheConfig,

    /// Bindings applied after workflow and job env (CLI `--env`)
    pub extra_env: BTreeMap<String, String>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        let shell = std::env::var("CIRUN_SHELL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SHELL.to_string());

        let runner_labels = std::env::var("CIRUN_RUNNER_LABELS")
            .ok()
            .map(|raw| parse_labels(&raw))
            .filter(|labels| !labels.is_empty())
            .unwrap_or_else(|| DEFAULT_RUNNER_LABELS.iter().map(|l| l.to_string()).collect());

        RunnerSettings {
            shell: split_shell(&shell),
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            checkout: CheckoutMode::InPlace,
            runner_labels,
            cache: CacheConfig::from_env(),
            extra_env: BTreeMap::new(),
        }
    }
}

impl RunnerSettings {
    /// Create settings from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// Clone the workspace into a fresh directory per job
    pub fn isolated(mut self) -> Self {
        self.checkout = CheckoutMode::Clone {
            source: self.workspace.display().to_string(),
        };
        self
    }

    pub fn with_shell(mut self, shell: &str) -> Self {
        self.shell = split_shell(shell);
        self
    }

    pub fn with_runner_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runner_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.extra_env.insert(key.to_string(), value.to_string());
        self
    }

    /// Whether this host can run a job with the given `runs-on` labels
    pub fn accepts_labels(&self, labels: &[String]) -> bool {
        !labels.is_empty()
            && labels
                .iter()
                .all(|label| self.runner_labels.iter().any(|l| l.eq_ignore_ascii_case(label)))
    }

    pub fn is_isolated(&self) -> bool {
        matches!(self.checkout, CheckoutMode::Clone { .. })
    }
}

fn parse_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a shell command line on whitespace
pub fn split_shell(shell: &str) -> Vec<String> {
    shell.split_whitespace().map(str::to_string).collect()
}
