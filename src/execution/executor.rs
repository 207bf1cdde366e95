//! Job executor - provisions a job and runs its steps in order

use crate::{
    cache::is_wrapper_failure,
    core::{
        context::JobContext,
        job::{Job, MAX_TIMEOUT_MINUTES},
        state::{ExecutionStatus, JobState, StepState},
        step::{Step, StepKind},
        trigger::RepositoryEvent,
    },
    execution::events::{EventBus, ExecutionEvent},
    runner::{StepOutput, StepRunner},
    settings::RunnerSettings,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How a step ended before tolerance rules are applied
#[derive(Debug)]
enum StepResult {
    Success {
        output: StepOutput,
        attempts: usize,
    },
    Failure {
        error: String,
        output: Option<StepOutput>,
        attempts: usize,
    },
}

/// Executes jobs with a step runner
pub struct JobExecutor<R> {
    runner: Arc<R>,
    settings: RunnerSettings,
    events: Arc<EventBus>,
}

impl<R: StepRunner> JobExecutor<R> {
    pub fn new(runner: Arc<R>, settings: RunnerSettings, events: Arc<EventBus>) -> Self {
        Self {
            runner,
            settings,
            events,
        }
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Provision a clean context for a job and bind its environment
    ///
    /// Fails when this host does not accept the job's runner labels.
    pub fn provision(
        &self,
        job: &Job,
        run_id: Uuid,
        event: &RepositoryEvent,
        workflow_env: &BTreeMap<String, String>,
    ) -> Result<JobContext> {
        if !self.settings.accepts_labels(&job.runner) {
            anyhow::bail!(
                "No runner for labels {:?} (this host accepts {:?})",
                job.runner,
                self.settings.runner_labels
            );
        }

        let mut ctx = JobContext::provision(run_id, &job.id, job.runner_label(), event, &self.settings)?;
        ctx.bind(workflow_env);
        ctx.bind(&job.env);
        ctx.bind(&self.settings.extra_env);
        Ok(ctx)
    }

    /// Provision and execute a job; provisioning errors fail the job
    pub async fn run(
        &self,
        job: &mut Job,
        run_id: Uuid,
        event: &RepositoryEvent,
        workflow_env: &BTreeMap<String, String>,
    ) -> ExecutionStatus {
        match self.provision(job, run_id, event, workflow_env) {
            Ok(mut ctx) => self.execute(job, &mut ctx).await,
            Err(e) => {
                error!(job = %job.id, error = %e, "failed to provision job");
                let now = Utc::now();
                job.state = JobState::Failed {
                    error: format!("{:#}", e),
                    started_at: now,
                    failed_at: now,
                };
                job.skip_remaining("job could not be provisioned");
                self.events.emit(ExecutionEvent::JobCompleted {
                    job_id: job.id.clone(),
                    status: ExecutionStatus::Failed,
                });
                ExecutionStatus::Failed
            }
        }
    }

    /// Execute the steps of a job in declared order
    pub async fn execute(&self, job: &mut Job, ctx: &mut JobContext) -> ExecutionStatus {
        let started_at = Utc::now();
        let now = Instant::now();
        let deadline = now
            .checked_add(Duration::from_secs(job.timeout_secs))
            .unwrap_or_else(|| now + Duration::from_secs(MAX_TIMEOUT_MINUTES * 60));
        job.state = JobState::Running { started_at };

        info!(job = %job.id, runner = %job.runner_label(), steps = job.steps.len(), "starting job");
        self.events.emit(ExecutionEvent::JobStarted {
            job_id: job.id.clone(),
            runner: job.runner_label().to_string(),
            total_steps: job.steps.len(),
        });

        let mut first_error: Option<String> = None;

        for index in 0..job.steps.len() {
            let mut step = job.steps[index].clone();
            let job_failed = first_error.is_some();

            if !step.condition.should_run(job_failed) {
                let reason = if job_failed {
                    "an earlier step failed"
                } else {
                    "no earlier step failed"
                };
                debug!(job = %job.id, step = %step.name, reason, "skipping step");
                job.steps[index].state = StepState::Skipped {
                    reason: reason.to_string(),
                };
                self.events.emit(ExecutionEvent::StepSkipped {
                    job_id: job.id.clone(),
                    step_index: index,
                    step_name: step.name.clone(),
                    reason: reason.to_string(),
                });
                continue;
            }

            let step_started = Utc::now();
            let result = self.run_step(&job.id, &mut step, ctx, deadline).await;
            let state = self.settle(&job.id, &step, ctx, result, step_started);

            if let StepState::Failed { error, .. } = &state {
                first_error.get_or_insert_with(|| format!("step '{}' failed: {}", step.name, error));
            }
            job.steps[index].state = state;
        }

        let status = match first_error {
            Some(error) => {
                warn!(job = %job.id, error = %error, "job failed");
                job.state = JobState::Failed {
                    error,
                    started_at,
                    failed_at: Utc::now(),
                };
                ExecutionStatus::Failed
            }
            None => {
                info!(job = %job.id, "job completed");
                job.state = JobState::Completed {
                    started_at,
                    completed_at: Utc::now(),
                };
                ExecutionStatus::Completed
            }
        };

        self.events.emit(ExecutionEvent::JobCompleted {
            job_id: job.id.clone(),
            status,
        });
        status
    }

    /// Run a step, retrying once without the cache wrapper on wrapper failures
    async fn run_step(
        &self,
        job_id: &str,
        step: &mut Step,
        ctx: &mut JobContext,
        deadline: Instant,
    ) -> StepResult {
        let mut attempt = 1;
        loop {
            step.state = StepState::Running {
                started_at: Utc::now(),
                attempt,
            };
            self.events.emit(ExecutionEvent::StepStarted {
                job_id: job_id.to_string(),
                step_index: step.index,
                step_name: step.name.clone(),
                attempt,
            });

            if let Err(e) = ctx.reset_command_files() {
                return StepResult::Failure {
                    error: format!("{:#}", e),
                    output: None,
                    attempts: attempt,
                };
            }

            let env = ctx.step_environment(step);
            let output = match self.attempt(step, &env, ctx, deadline).await {
                Ok(output) => output,
                Err(error) => {
                    return StepResult::Failure {
                        error,
                        output: None,
                        attempts: attempt,
                    }
                }
            };

            if output.success() {
                return self.check_output(step, output, attempt);
            }

            let wrapper = env.get("RUSTC_WRAPPER").filter(|w| !w.trim().is_empty());
            let retry_uncached = attempt == 1
                && step.kind.is_compile()
                && wrapper
                    .map(|w| is_wrapper_failure(&output.stderr, wrapper_name(w)))
                    .unwrap_or(false);

            if retry_uncached {
                let reason = format!(
                    "cache wrapper '{}' failed, retrying without it",
                    wrapper.map(String::as_str).unwrap_or_default()
                );
                warn!(job = %job_id, step = %step.name, "{}", reason);
                ctx.disable_wrapper();
                attempt += 1;
                self.events.emit(ExecutionEvent::StepRetrying {
                    job_id: job_id.to_string(),
                    step_index: step.index,
                    step_name: step.name.clone(),
                    attempt,
                    reason,
                });
                continue;
            }

            return StepResult::Failure {
                error: format!("exited with code {}", output.exit_code),
                output: Some(output),
                attempts: attempt,
            };
        }
    }

    /// One runner invocation bounded by the step timeout and the job deadline
    async fn attempt(
        &self,
        step: &Step,
        env: &HashMap<String, String>,
        ctx: &JobContext,
        deadline: Instant,
    ) -> Result<StepOutput, String> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err("job timed out before the step started".to_string());
        }
        let budget = step
            .timeout_secs
            .map(|secs| Duration::from_secs(secs).min(remaining))
            .unwrap_or(remaining);

        debug!(step = %step.name, kind = step.kind.label(), budget_secs = budget.as_secs(), "running step");
        match timeout(budget, self.runner.run_step(step, env, ctx)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {} seconds", budget.as_secs())),
        }
    }

    /// Apply output checks that can fail an otherwise successful step
    fn check_output(&self, step: &Step, output: StepOutput, attempts: usize) -> StepResult {
        if step.kind == StepKind::Lint {
            let warnings = output.warnings().len();
            if warnings > 0 {
                return StepResult::Failure {
                    error: format!("lint reported {} warning(s)", warnings),
                    output: Some(output),
                    attempts,
                };
            }
        }
        StepResult::Success { output, attempts }
    }

    /// Turn a step result into its final state and update the job binding
    fn settle(
        &self,
        job_id: &str,
        step: &Step,
        ctx: &mut JobContext,
        result: StepResult,
        started_at: DateTime<Utc>,
    ) -> StepState {
        let result = match result {
            StepResult::Success { output, attempts } => match ctx.read_command_files() {
                Ok((exports, path)) => {
                    ctx.apply_exports(&output.exports);
                    ctx.apply_exports(&exports);
                    ctx.prepend_path(&output.path);
                    ctx.prepend_path(&path);
                    StepResult::Success { output, attempts }
                }
                Err(e) => StepResult::Failure {
                    error: format!("{:#}", e),
                    output: Some(output),
                    attempts,
                },
            },
            failure => failure,
        };

        match result {
            StepResult::Success { output, attempts } => {
                info!(job = %job_id, step = %step.name, duration_ms = output.duration_ms, "step completed");
                self.events.emit(ExecutionEvent::StepCompleted {
                    job_id: job_id.to_string(),
                    step_index: step.index,
                    step_name: step.name.clone(),
                    duration_ms: output.duration_ms,
                });
                StepState::Completed {
                    exit_code: output.exit_code,
                    output: output.combined(),
                    attempts,
                    started_at,
                    completed_at: Utc::now(),
                }
            }
            StepResult::Failure { error, output, attempts } if step.tolerates_failure() => {
                let reason = if step.kind == StepKind::CacheSetup {
                    let cache = &self.settings.cache;
                    if ctx.remove_wrapper_binding(|value| cache.points_at_wrapper(value)) {
                        info!(job = %job_id, wrapper = %cache.wrapper, "removed RUSTC_WRAPPER binding");
                    }
                    let detail = output
                        .as_ref()
                        .map(|o| o.stderr.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| error.clone());
                    format!("compilation cache unavailable, continuing uncached: {}", detail)
                } else {
                    format!("failure tolerated by continue-on-error: {}", error)
                };
                warn!(job = %job_id, step = %step.name, attempts, "{}", reason);
                self.events.emit(ExecutionEvent::StepDegraded {
                    job_id: job_id.to_string(),
                    step_index: step.index,
                    step_name: step.name.clone(),
                    reason: reason.clone(),
                });
                StepState::Degraded {
                    reason,
                    exit_code: output.as_ref().map(|o| o.exit_code),
                    output: output.map(|o| o.combined()).unwrap_or_default(),
                    started_at,
                    completed_at: Utc::now(),
                }
            }
            StepResult::Failure { error, output, attempts } => {
                error!(job = %job_id, step = %step.name, error = %error, "step failed");
                let text = output.as_ref().map(|o| o.combined()).unwrap_or_default();
                self.events.emit(ExecutionEvent::StepFailed {
                    job_id: job_id.to_string(),
                    step_index: step.index,
                    step_name: step.name.clone(),
                    error: error.clone(),
                    output: text.clone(),
                });
                StepState::Failed {
                    error,
                    exit_code: output.map(|o| o.exit_code),
                    output: text,
                    attempts,
                    last_started_at: started_at,
                    failed_at: Utc::now(),
                }
            }
        }
    }
}

fn wrapper_name(value: &str) -> &str {
    Path::new(value.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(value)
}
