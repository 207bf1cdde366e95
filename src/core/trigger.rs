//! Trigger evaluation - decides whether a repository event starts a run

use crate::core::config::{BranchFilterConfig, OnConfig};
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while compiling a branch pattern
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("empty branch pattern")]
    Empty,

    #[error("pattern '{pattern}': '{quantifier}' has nothing to repeat")]
    DanglingQuantifier { pattern: String, quantifier: char },

    #[error("pattern '{0}': unterminated character class")]
    UnterminatedClass(String),

    #[error("pattern '{0}': trailing escape character")]
    TrailingEscape(String),

    #[error("pattern '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Repository event kinds a workflow can react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "push" => Ok(EventKind::Push),
            "pull_request" | "pull-request" | "pr" => Ok(EventKind::PullRequest),
            other => anyhow::bail!("unsupported event '{}' (expected push or pull_request)", other),
        }
    }
}

/// A git ref as seen by the trigger evaluator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "name")]
pub enum GitRef {
    Branch(String),
    Tag(String),
}

impl GitRef {
    /// Parse `refs/heads/<b>`, `refs/tags/<t>` or a bare branch name
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(branch) = raw.strip_prefix("refs/heads/") {
            GitRef::Branch(branch.to_string())
        } else if let Some(tag) = raw.strip_prefix("refs/tags/") {
            GitRef::Tag(tag.to_string())
        } else {
            GitRef::Branch(raw.to_string())
        }
    }

    pub fn branch(&self) -> Option<&str> {
        match self {
            GitRef::Branch(name) => Some(name),
            GitRef::Tag(_) => None,
        }
    }

    pub fn short_name(&self) -> &str {
        match self {
            GitRef::Branch(name) | GitRef::Tag(name) => name,
        }
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitRef::Branch(name) => write!(f, "refs/heads/{}", name),
            GitRef::Tag(name) => write!(f, "refs/tags/{}", name),
        }
    }
}

/// An incoming repository event
///
/// For pull requests `git_ref` is the base branch the PR targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEvent {
    pub kind: EventKind,
    pub git_ref: GitRef,
    pub sha: Option<String>,
}

impl RepositoryEvent {
    pub fn new(kind: EventKind, git_ref: &str) -> Self {
        Self {
            kind,
            git_ref: GitRef::parse(git_ref),
            sha: None,
        }
    }

    pub fn push(git_ref: &str) -> Self {
        Self::new(EventKind::Push, git_ref)
    }

    pub fn pull_request(base_branch: &str) -> Self {
        Self::new(EventKind::PullRequest, base_branch)
    }

    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }
}

/// A compiled branch filter pattern
#[derive(Debug, Clone)]
pub struct BranchPattern {
    raw: String,
    negated: bool,
    regex: Regex,
}

impl BranchPattern {
    /// Compile a filter pattern.
    ///
    /// `*` matches within one path segment, `**` across segments, `?` and `+`
    /// repeat the preceding character, `[...]` is a character class and a
    /// leading `!` negates the pattern.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let (negated, body) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        if body.is_empty() {
            return Err(PatternError::Empty);
        }

        let mut out = String::from("^");
        let mut chars = body.chars().peekable();
        // Whether the last emitted token can take a quantifier
        let mut repeatable = false;

        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    if chars.peek() == Some(&'*') {
                        chars.next();
                        out.push_str(".*");
                    } else {
                        out.push_str("[^/]*");
                    }
                    repeatable = false;
                }
                '?' | '+' => {
                    if !repeatable {
                        return Err(PatternError::DanglingQuantifier {
                            pattern: raw.to_string(),
                            quantifier: c,
                        });
                    }
                    out.push(c);
                    repeatable = false;
                }
                '[' => {
                    out.push('[');
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        match inner {
                            ']' => {
                                closed = true;
                                break;
                            }
                            '[' | '\\' | '&' | '~' => {
                                out.push('\\');
                                out.push(inner);
                            }
                            _ => out.push(inner),
                        }
                    }
                    if !closed {
                        return Err(PatternError::UnterminatedClass(raw.to_string()));
                    }
                    out.push(']');
                    repeatable = true;
                }
                '\\' => {
                    let escaped = chars
                        .next()
                        .ok_or_else(|| PatternError::TrailingEscape(raw.to_string()))?;
                    out.push_str(&regex::escape(&escaped.to_string()));
                    repeatable = true;
                }
                _ => {
                    out.push_str(&regex::escape(&c.to_string()));
                    repeatable = true;
                }
            }
        }
        out.push('$');

        let regex = Regex::new(&out).map_err(|source| PatternError::Regex {
            pattern: raw.to_string(),
            source,
        })?;

        Ok(Self {
            raw: raw.to_string(),
            negated,
            regex,
        })
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern body matches the name (ignores negation)
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Branch filter attached to one event kind
#[derive(Debug, Clone)]
pub enum BranchFilter {
    /// No filter: every ref activates
    Any,
    /// Ordered include patterns; a later negated pattern can exclude again
    Include(Vec<BranchPattern>),
    /// Every branch except those matching
    Exclude(Vec<BranchPattern>),
}

impl BranchFilter {
    pub fn from_config(config: Option<&BranchFilterConfig>) -> Result<Self> {
        let Some(config) = config else {
            return Ok(BranchFilter::Any);
        };

        if let Some(key) = config.other.keys().next() {
            anyhow::bail!("unsupported trigger filter '{}'", key);
        }

        match (&config.branches, &config.branches_ignore) {
            (Some(_), Some(_)) => {
                anyhow::bail!("'branches' and 'branches-ignore' cannot be used for the same event")
            }
            (Some(branches), None) => {
                let patterns = compile_patterns(branches)?;
                if !patterns.is_empty() && patterns.iter().all(|p| p.is_negated()) {
                    anyhow::bail!(
                        "branch filter needs at least one positive pattern, got only negations: {:?}",
                        branches
                    );
                }
                Ok(BranchFilter::Include(patterns))
            }
            (None, Some(ignored)) => {
                let patterns = compile_patterns(ignored)?;
                if patterns.iter().any(|p| p.is_negated()) {
                    anyhow::bail!("'branches-ignore' does not accept negated patterns");
                }
                Ok(BranchFilter::Exclude(patterns))
            }
            (None, None) => Ok(BranchFilter::Any),
        }
    }

    /// Check whether a ref passes this filter
    pub fn matches(&self, git_ref: &GitRef) -> bool {
        match self {
            BranchFilter::Any => true,
            BranchFilter::Include(patterns) => {
                let Some(branch) = git_ref.branch() else {
                    return false;
                };
                let mut included = false;
                for pattern in patterns {
                    if pattern.matches(branch) {
                        included = !pattern.is_negated();
                    }
                }
                included
            }
            BranchFilter::Exclude(patterns) => match git_ref.branch() {
                Some(branch) => !patterns.iter().any(|p| p.matches(branch)),
                None => false,
            },
        }
    }
}

fn compile_patterns(raw: &[String]) -> Result<Vec<BranchPattern>> {
    raw.iter()
        .map(|p| BranchPattern::parse(p).map_err(anyhow::Error::from))
        .collect()
}

/// One event kind the workflow listens to
#[derive(Debug, Clone)]
pub struct TriggerRule {
    pub event: EventKind,
    pub filter: BranchFilter,
}

/// Outcome of evaluating an event against the workflow triggers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerDecision {
    Activated,
    Ignored { reason: String },
}

impl TriggerDecision {
    pub fn is_activated(&self) -> bool {
        matches!(self, TriggerDecision::Activated)
    }
}

/// The set of trigger rules of a workflow
#[derive(Debug, Clone)]
pub struct Triggers {
    rules: Vec<TriggerRule>,
}

impl Triggers {
    /// Compile the `on:` section of a workflow
    pub fn from_config(on: &OnConfig) -> Result<Self> {
        let mut rules = Vec::new();

        match on {
            OnConfig::Event(name) => rules.push(TriggerRule {
                event: name.parse()?,
                filter: BranchFilter::Any,
            }),
            OnConfig::Events(names) => {
                for name in names {
                    rules.push(TriggerRule {
                        event: name.parse()?,
                        filter: BranchFilter::Any,
                    });
                }
            }
            OnConfig::Filters(filters) => {
                if let Some(name) = filters.other.keys().next() {
                    anyhow::bail!("unsupported event '{}' (expected push or pull_request)", name);
                }
                if let Some(push) = &filters.push {
                    rules.push(TriggerRule {
                        event: EventKind::Push,
                        filter: BranchFilter::from_config(push.as_ref())?,
                    });
                }
                if let Some(pr) = &filters.pull_request {
                    rules.push(TriggerRule {
                        event: EventKind::PullRequest,
                        filter: BranchFilter::from_config(pr.as_ref())?,
                    });
                }
            }
        }

        if rules.is_empty() {
            anyhow::bail!("workflow has no triggers");
        }

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[TriggerRule] {
        &self.rules
    }

    /// Decide whether the event starts a run. Not matching is not an error.
    pub fn evaluate(&self, event: &RepositoryEvent) -> TriggerDecision {
        let mut listened = false;
        for rule in self.rules.iter().filter(|r| r.event == event.kind) {
            listened = true;
            if rule.filter.matches(&event.git_ref) {
                return TriggerDecision::Activated;
            }
        }

        let reason = if listened {
            format!("{} on '{}' does not match the branch filter", event.kind, event.git_ref.short_name())
        } else {
            format!("workflow does not listen to {} events", event.kind)
        };
        TriggerDecision::Ignored { reason }
    }
}
