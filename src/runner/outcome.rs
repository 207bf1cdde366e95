//! Step runner output and error types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Error types for step runners
///
/// These are infrastructure failures: the step could not be run at all.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported action '{0}'")]
    UnsupportedAction(String),

    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// What a step produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,

    /// Bindings for later steps, set by built-in actions
    pub exports: BTreeMap<String, String>,

    /// `PATH` entries for later steps, set by built-in actions
    pub path: Vec<String>,

    pub duration_ms: u64,
}

impl StepOutput {
    /// A successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    /// A failed output with the given exit code and stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn with_export(mut self, key: &str, value: impl Into<String>) -> Self {
        self.exports.insert(key.to_string(), value.into());
        self
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }

    /// Lines of either stream that are compiler warnings
    pub fn warnings(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .filter(|line| is_warning_line(line))
            .collect()
    }
}

/// A `warning:` diagnostic; cargo's per-crate `generated N warnings` summary is not one
pub fn is_warning_line(line: &str) -> bool {
    let line = line.trim_start();
    if let Some(rest) = line.strip_prefix("warning:") {
        return !is_warning_summary(rest);
    }
    line.starts_with("warning[")
}

/// `warning: `demo` (lib) generated 2 warnings`
fn is_warning_summary(rest: &str) -> bool {
    rest.split_once(") generated ")
        .map(|(_, tail)| tail.contains(" warning"))
        .unwrap_or(false)
}
