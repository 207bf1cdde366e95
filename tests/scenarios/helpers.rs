//! Test utilities for workflow scenarios

use async_trait::async_trait;
use cirun::cache::CacheConfig;
use cirun::core::config::WorkflowConfig;
use cirun::core::{ExecutionStatus, JobContext, RepositoryEvent, Step, StepKind, StepState, Workflow};
use cirun::execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy};
use cirun::runner::{RunnerError, StepOutput, StepRunner};
use cirun::settings::RunnerSettings;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// The canonical Rust CI workflow shipped with the repository
pub const RUST_CI: &str = include_str!("../../.github/workflows/ci.yml");

/// Which steps a scripted reply applies to
#[derive(Debug, Clone)]
pub enum Match {
    Kind(StepKind),
    /// Rendered command contains the text
    Command(&'static str),
}

impl Match {
    fn applies(&self, step: &Step, command: Option<&str>) -> bool {
        match self {
            Match::Kind(kind) => step.kind == *kind,
            Match::Command(needle) => command.map(|c| c.contains(needle)).unwrap_or(false),
        }
    }
}

struct Rule {
    matcher: Match,
    /// Replies in order; the last one repeats
    replies: Vec<StepOutput>,
    /// Appended to the `CIRUN_ENV` command file
    env_file: Option<&'static str>,
}

/// One call the runner received
#[derive(Debug, Clone)]
pub struct Invocation {
    pub job_id: String,
    pub step_name: String,
    pub kind: StepKind,
    pub command: Option<String>,
    pub env: HashMap<String, String>,
    /// Attempt number from the step's running state
    pub attempt: Option<usize>,
}

impl Invocation {
    pub fn wrapper(&self) -> Option<&str> {
        self.env.get("RUSTC_WRAPPER").map(String::as_str)
    }
}

pub type CallLog = Arc<Mutex<Vec<Invocation>>>;

/// Step runner answering from a script; unscripted steps succeed
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    hits: Mutex<Vec<usize>>,
    calls: CallLog,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, matcher: Match, output: StepOutput) -> Self {
        self.replies(matcher, vec![output])
    }

    pub fn replies(mut self, matcher: Match, replies: Vec<StepOutput>) -> Self {
        self.rules.push(Rule {
            matcher,
            replies,
            env_file: None,
        });
        self.hits.lock().unwrap().push(0);
        self
    }

    /// Succeed and write `content` to the step's `CIRUN_ENV` file
    pub fn writes_env(mut self, matcher: Match, content: &'static str) -> Self {
        self.rules.push(Rule {
            matcher,
            replies: vec![StepOutput::ok("")],
            env_file: Some(content),
        });
        self.hits.lock().unwrap().push(0);
        self
    }

    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }
}

#[async_trait]
impl StepRunner for ScriptedRunner {
    async fn run_step(
        &self,
        step: &Step,
        env: &HashMap<String, String>,
        ctx: &JobContext,
    ) -> Result<StepOutput, RunnerError> {
        let command = step.render_command(env);
        self.calls.lock().unwrap().push(Invocation {
            job_id: ctx.job_id.clone(),
            step_name: step.name.clone(),
            kind: step.kind,
            command: command.clone(),
            env: env.clone(),
            attempt: match step.state {
                StepState::Running { attempt, .. } => Some(attempt),
                _ => None,
            },
        });

        let Some(index) = self
            .rules
            .iter()
            .position(|rule| rule.matcher.applies(step, command.as_deref()))
        else {
            return Ok(StepOutput::ok(format!("{} ok", step.name)));
        };

        let rule = &self.rules[index];
        let hit = {
            let mut hits = self.hits.lock().unwrap();
            let hit = hits[index];
            hits[index] += 1;
            hit
        };

        if let Some(content) = rule.env_file {
            let path = env.get("CIRUN_ENV").expect("CIRUN_ENV is set for every step");
            let mut file = std::fs::OpenOptions::new().append(true).create(true).open(path)?;
            writeln!(file, "{}", content)?;
        }

        Ok(rule.replies[hit.min(rule.replies.len() - 1)].clone())
    }
}

/// Settings for scenario runs: cache wrapper `sccache`, Linux runner labels
pub fn test_settings() -> RunnerSettings {
    RunnerSettings::default()
        .with_workspace(std::env::temp_dir())
        .with_runner_labels(["ubuntu-latest", "local"])
        .with_cache(CacheConfig::new("sccache"))
}

pub fn load(yaml: &str) -> Workflow {
    WorkflowConfig::from_yaml(yaml)
        .expect("workflow should parse")
        .to_workflow()
        .expect("workflow should build")
}

/// Result of a scenario run
#[derive(Debug)]
pub struct TestRun {
    pub workflow: Workflow,
    pub status: ExecutionStatus,
    pub events: Vec<ExecutionEvent>,
    pub calls: Vec<Invocation>,
}

pub async fn run_workflow(yaml: &str, event: RepositoryEvent, runner: ScriptedRunner) -> TestRun {
    run_workflow_with(yaml, event, runner, SchedulingStrategy::Sequential).await
}

pub async fn run_workflow_with(
    yaml: &str,
    event: RepositoryEvent,
    runner: ScriptedRunner,
    strategy: SchedulingStrategy,
) -> TestRun {
    let mut workflow = load(yaml);
    let calls = runner.calls();

    let engine = ExecutionEngine::new(runner, test_settings(), strategy);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

    let status = engine
        .execute(&mut workflow, &event)
        .await
        .expect("run should not be stuck");

    let events = events.lock().unwrap().clone();
    let calls = calls.lock().unwrap().clone();
    TestRun {
        workflow,
        status,
        events,
        calls,
    }
}

impl TestRun {
    pub fn step_state(&self, job_id: &str, step_name: &str) -> &StepState {
        let job = self.workflow.job(job_id).expect("job exists");
        &job
            .steps
            .iter()
            .find(|s| s.name == step_name)
            .unwrap_or_else(|| panic!("no step '{}' in job '{}'", step_name, job_id))
            .state
    }

    /// Kinds of the steps the runner was asked to run, in order
    pub fn kinds_run(&self) -> Vec<StepKind> {
        self.calls.iter().map(|c| c.kind).collect()
    }

    pub fn calls_for(&self, step_name: &str) -> Vec<&Invocation> {
        self.calls.iter().filter(|c| c.step_name == step_name).collect()
    }

    pub fn jobs_run(&self) -> Vec<String> {
        let mut jobs: Vec<String> = Vec::new();
        for call in &self.calls {
            if jobs.last() != Some(&call.job_id) {
                jobs.push(call.job_id.clone());
            }
        }
        jobs
    }
}

pub fn assert_run_status(run: &TestRun, expected: ExecutionStatus) {
    assert_eq!(
        run.status, expected,
        "run status: expected {:?}, got {:?}",
        expected, run.status
    );
    assert_eq!(run.workflow.state.status, expected);
}

pub fn assert_step_completed(run: &TestRun, job_id: &str, step_name: &str) {
    let state = run.step_state(job_id, step_name);
    assert!(
        matches!(state, StepState::Completed { .. }),
        "step '{}' should be completed, got {:?}",
        step_name,
        state
    );
}

pub fn assert_step_failed(run: &TestRun, job_id: &str, step_name: &str, error_contains: &str) {
    match run.step_state(job_id, step_name) {
        StepState::Failed { error, .. } => assert!(
            error.contains(error_contains),
            "step '{}' error '{}' should contain '{}'",
            step_name,
            error,
            error_contains
        ),
        other => panic!("step '{}' should have failed, got {:?}", step_name, other),
    }
}

pub fn assert_step_skipped(run: &TestRun, job_id: &str, step_name: &str) {
    let state = run.step_state(job_id, step_name);
    assert!(
        matches!(state, StepState::Skipped { .. }),
        "step '{}' should be skipped, got {:?}",
        step_name,
        state
    );
    assert!(run.calls_for(step_name).is_empty(), "skipped step '{}' was run", step_name);
}

pub fn assert_step_degraded(run: &TestRun, job_id: &str, step_name: &str) {
    let state = run.step_state(job_id, step_name);
    assert!(
        matches!(state, StepState::Degraded { .. }),
        "step '{}' should be degraded, got {:?}",
        step_name,
        state
    );
}
