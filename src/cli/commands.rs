//! CLI command definitions

use crate::core::EventKind;
use crate::execution::SchedulingStrategy;
use clap::Args;
use std::path::PathBuf;

/// Default workflow location, relative to the working directory
pub const DEFAULT_WORKFLOW: &str = ".github/workflows/ci.yml";

/// Run a workflow for an event
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to workflow YAML file
    #[arg(short, long, default_value = DEFAULT_WORKFLOW)]
    pub file: PathBuf,

    /// Event kind (push or pull_request)
    #[arg(short, long, default_value = "push", value_parser = parse_event)]
    pub event: EventKind,

    /// Pushed ref, or the base branch of a pull request
    #[arg(short = 'r', long = "ref", default_value = "main")]
    pub git_ref: String,

    /// Commit to check out
    #[arg(long)]
    pub sha: Option<String>,

    /// Source directory (defaults to the current directory)
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// Clone the sources into a fresh workspace per job
    #[arg(long)]
    pub isolated: bool,

    /// Job scheduling: sequential, parallel or limited:<n>
    #[arg(long, default_value = "sequential", value_parser = parse_strategy)]
    pub strategy: SchedulingStrategy,

    /// Environment overrides (KEY=VALUE)
    #[arg(long = "env", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Default shell for run steps
    #[arg(long, env = "CIRUN_SHELL")]
    pub shell: Option<String>,

    /// Compiler cache wrapper
    #[arg(long, env = "CIRUN_CACHE_WRAPPER")]
    pub cache_wrapper: Option<String>,

    /// Treat the compilation cache as unavailable
    #[arg(long)]
    pub no_cache: bool,

    /// Runner labels this host accepts
    #[arg(long = "runner-label", env = "CIRUN_RUNNER_LABELS", value_delimiter = ',')]
    pub runner_labels: Vec<String>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Evaluate triggers and print the plan without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Lines of output to show for failed steps
    #[arg(long, default_value_t = 20)]
    pub output_lines: usize,
}

/// Validate a workflow file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to workflow YAML file
    #[arg(short, long, default_value = DEFAULT_WORKFLOW)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Check whether an event would start a run
#[derive(Debug, Args, Clone)]
pub struct TriggerCommand {
    /// Path to workflow YAML file
    #[arg(short, long, default_value = DEFAULT_WORKFLOW)]
    pub file: PathBuf,

    /// Event kind (push or pull_request)
    #[arg(short, long, default_value = "push", value_parser = parse_event)]
    pub event: EventKind,

    /// Pushed ref, or the base branch of a pull request
    #[arg(short = 'r', long = "ref")]
    pub git_ref: String,
}

/// List workflows in history
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show run counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run
    #[arg(long)]
    pub run_id: Option<String>,
}

fn parse_event(s: &str) -> Result<EventKind, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

fn parse_strategy(s: &str) -> Result<SchedulingStrategy, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid KEY=VALUE pair: {}", s)),
    }
}
