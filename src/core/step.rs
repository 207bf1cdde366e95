//! Step domain model

use crate::core::{
    condition::StepCondition,
    config::{render_map, StepConfig},
    state::StepState,
};
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Actions that fetch the repository into the workspace
pub const CHECKOUT_ACTIONS: &[&str] = &["actions/checkout"];

/// Actions that install or select a Rust toolchain
pub const TOOLCHAIN_ACTIONS: &[&str] = &[
    "dtolnay/rust-toolchain",
    "actions-rs/toolchain",
    "actions-rust-lang/setup-rust-toolchain",
];

/// Actions that configure a compilation cache
pub const CACHE_ACTIONS: &[&str] = &[
    "mozilla-actions/sccache-action",
    "actions/cache",
    "swatinem/rust-cache",
];

/// Reference to a reusable action: `owner/repo[/path]@version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRef {
    pub owner: String,
    pub repo: String,
    pub path: Option<String>,
    pub version: String,
}

impl ActionRef {
    /// `owner/repo`, lowercased for comparisons
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo).to_lowercase()
    }

    /// Check whether this action is one of the named repositories
    pub fn is_one_of(&self, names: &[&str]) -> bool {
        let repository = self.repository();
        names.iter().any(|n| repository == *n)
    }
}

impl FromStr for ActionRef {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.starts_with("./") || raw.starts_with("docker://") {
            anyhow::bail!("local and docker actions are not supported: '{}'", raw);
        }

        let (name, version) = raw
            .split_once('@')
            .ok_or_else(|| anyhow::anyhow!("action '{}' is missing an '@<version>' suffix", raw))?;
        if version.is_empty() {
            anyhow::bail!("action '{}' has an empty version", raw);
        }

        let mut parts = name.splitn(3, '/');
        let owner = parts.next().unwrap_or_default();
        let repo = parts.next().unwrap_or_default();
        if owner.is_empty() || repo.is_empty() {
            anyhow::bail!("action '{}' must look like owner/repo@version", raw);
        }
        let path = parts.next().filter(|p| !p.is_empty()).map(str::to_string);

        Ok(ActionRef {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path,
            version: version.to_string(),
        })
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)?;
        if let Some(path) = &self.path {
            write!(f, "/{}", path)?;
        }
        write!(f, "@{}", self.version)
    }
}

/// What a step does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Reusable action with its inputs
    Uses {
        action: ActionRef,
        with: BTreeMap<String, String>,
    },
    /// Inline shell command
    Run {
        command: String,
        shell: Option<String>,
        working_directory: Option<String>,
    },
}

/// Role of a step in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Checkout,
    ToolchainSetup,
    CacheSetup,
    FormatCheck,
    Build,
    Test,
    Lint,
    /// Any other inline command
    Command,
    /// Any other action
    Action,
}

impl StepKind {
    /// Classify a step by the action it references or the command it runs
    pub fn classify(action: &StepAction) -> Self {
        match action {
            StepAction::Uses { action, .. } => {
                if action.is_one_of(CHECKOUT_ACTIONS) {
                    StepKind::Checkout
                } else if action.is_one_of(TOOLCHAIN_ACTIONS) {
                    StepKind::ToolchainSetup
                } else if action.is_one_of(CACHE_ACTIONS) || action.repository().contains("sccache") {
                    StepKind::CacheSetup
                } else {
                    StepKind::Action
                }
            }
            StepAction::Run { command, .. } => command
                .lines()
                .find_map(classify_command_line)
                .unwrap_or(StepKind::Command),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Checkout => "checkout",
            StepKind::ToolchainSetup => "toolchain",
            StepKind::CacheSetup => "cache",
            StepKind::FormatCheck => "format",
            StepKind::Build => "build",
            StepKind::Test => "test",
            StepKind::Lint => "lint",
            StepKind::Command => "command",
            StepKind::Action => "action",
        }
    }

    /// Steps that invoke the compiler
    pub fn is_compile(&self) -> bool {
        matches!(self, StepKind::Build | StepKind::Test | StepKind::Lint)
    }
}

fn classify_command_line(line: &str) -> Option<StepKind> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.first().copied() {
        Some("cargo") => {
            // Skip a `+toolchain` override
            let sub = tokens[1..].iter().find(|t| !t.starts_with('+')).copied()?;
            match sub {
                "fmt" if tokens.contains(&"--check") => Some(StepKind::FormatCheck),
                "build" | "check" => Some(StepKind::Build),
                "test" | "nextest" => Some(StepKind::Test),
                "clippy" => Some(StepKind::Lint),
                _ => None,
            }
        }
        Some("rustfmt") if tokens.contains(&"--check") => Some(StepKind::FormatCheck),
        _ => None,
    }
}

/// A single step in a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Position in the job (0-based)
    pub index: usize,

    /// Optional step id
    pub id: Option<String>,

    /// Display name
    pub name: String,

    pub action: StepAction,

    pub kind: StepKind,

    /// Step-only bindings
    pub env: BTreeMap<String, String>,

    pub condition: StepCondition,

    pub continue_on_error: bool,

    /// Step timeout in seconds (bounded by the job deadline)
    pub timeout_secs: Option<u64>,

    /// Runtime state
    pub state: StepState,
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(index: usize, config: &StepConfig) -> Result<Self> {
        let action = match (&config.uses, &config.run) {
            (Some(uses), None) => StepAction::Uses {
                action: uses.parse()?,
                with: render_map(&config.with),
            },
            (None, Some(run)) => StepAction::Run {
                command: run.clone(),
                shell: config.shell.clone(),
                working_directory: config.working_directory.clone(),
            },
            _ => anyhow::bail!("step #{} needs exactly one of 'uses' or 'run'", index + 1),
        };

        let condition = match &config.condition {
            Some(raw) => raw.parse()?,
            None => StepCondition::default(),
        };

        let name = config
            .name
            .clone()
            .unwrap_or_else(|| default_step_name(&action));

        Ok(Step {
            index,
            id: config.id.clone(),
            name,
            kind: StepKind::classify(&action),
            action,
            env: render_map(&config.env),
            condition,
            continue_on_error: config.continue_on_error,
            timeout_secs: config.timeout_minutes.map(|m| m.saturating_mul(60)),
            state: StepState::Pending,
        })
    }

    /// Render the inline command with `${{ env.NAME }}` substitution
    pub fn render_command(&self, env: &HashMap<String, String>) -> Option<String> {
        match &self.action {
            StepAction::Run { command, .. } => Some(substitute_env(command, env)),
            StepAction::Uses { .. } => None,
        }
    }

    /// Render action inputs with `${{ env.NAME }}` substitution
    pub fn render_inputs(&self, env: &HashMap<String, String>) -> BTreeMap<String, String> {
        match &self.action {
            StepAction::Uses { with, .. } => with
                .iter()
                .map(|(k, v)| (k.clone(), substitute_env(v, env)))
                .collect(),
            StepAction::Run { .. } => BTreeMap::new(),
        }
    }

    /// Failures of this step are tolerated
    pub fn tolerates_failure(&self) -> bool {
        self.continue_on_error || self.kind == StepKind::CacheSetup
    }
}

fn default_step_name(action: &StepAction) -> String {
    match action {
        StepAction::Uses { action, .. } => format!("Run {}", action),
        StepAction::Run { command, .. } => {
            let first = command.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
            format!("Run {}", first.trim())
        }
    }
}

fn env_placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex is valid")
    })
}

/// Replace `${{ env.NAME }}` placeholders; unknown names render empty
pub fn substitute_env(template: &str, env: &HashMap<String, String>) -> String {
    env_placeholder()
        .replace_all(template, |caps: &regex::Captures| {
            env.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}
