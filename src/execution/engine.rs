//! Main execution engine - orchestrates an entire workflow run

use crate::{
    core::{
        state::{ExecutionStatus, JobState},
        trigger::{RepositoryEvent, TriggerDecision},
        Workflow,
    },
    execution::{
        events::{EventBus, ExecutionEvent},
        executor::JobExecutor,
        scheduler::{JobScheduler, SchedulingStrategy},
    },
    runner::StepRunner,
    settings::RunnerSettings,
};
use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Main workflow execution engine
pub struct ExecutionEngine<R> {
    scheduler: JobScheduler,
    executor: Arc<JobExecutor<R>>,
    events: Arc<EventBus>,
}

impl<R: StepRunner + 'static> ExecutionEngine<R> {
    pub fn new(runner: R, settings: RunnerSettings, strategy: SchedulingStrategy) -> Self {
        let events = Arc::new(EventBus::new());
        let executor = Arc::new(JobExecutor::new(Arc::new(runner), settings, events.clone()));

        Self {
            scheduler: JobScheduler::new(strategy),
            executor,
            events,
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler);
    }

    /// Run the workflow for an event
    ///
    /// An event that does not match the triggers leaves every job pending and
    /// returns `Ignored`; that is not an error.
    pub async fn execute(
        &self,
        workflow: &mut Workflow,
        event: &RepositoryEvent,
    ) -> Result<ExecutionStatus> {
        let run_id = workflow.state.run_id;

        if let TriggerDecision::Ignored { reason } = workflow.triggers.evaluate(event) {
            info!(workflow = %workflow.name, %reason, "event ignored");
            workflow.state.ignore();
            self.events.emit(ExecutionEvent::RunIgnored {
                run_id,
                workflow_name: workflow.name.clone(),
                reason,
            });
            return Ok(ExecutionStatus::Ignored);
        }

        info!(workflow = %workflow.name, %run_id, event = %event.kind, git_ref = %event.git_ref, "starting run");
        workflow.state.start(workflow.jobs.len());
        self.events.emit(ExecutionEvent::RunStarted {
            run_id,
            workflow_name: workflow.name.clone(),
            total_jobs: workflow.jobs.len(),
        });

        loop {
            self.skip_blocked(workflow);

            let batch = self.scheduler.next_jobs(workflow);
            if batch.is_empty() {
                if workflow.is_complete() {
                    break;
                }
                error!("No jobs ready to run and none running - run stuck");
                workflow.state.fail();
                self.events.emit(ExecutionEvent::RunCompleted {
                    run_id,
                    status: ExecutionStatus::Failed,
                });
                anyhow::bail!("Run stuck - no runnable jobs");
            }

            debug!(?batch, strategy = %self.scheduler.strategy(), "scheduling jobs");
            let mut tasks = JoinSet::new();
            for job_id in batch {
                let Some(job) = workflow.job_mut(&job_id) else {
                    continue;
                };
                job.state = JobState::Running {
                    started_at: chrono::Utc::now(),
                };
                // Each job task owns its own copy of the job
                let mut job = job.clone();
                let executor = self.executor.clone();
                let event = event.clone();
                let env = workflow.env.clone();
                tasks.spawn(async move {
                    executor.run(&mut job, run_id, &event, &env).await;
                    job
                });
            }
            workflow.refresh_counts();

            while let Some(joined) = tasks.join_next().await {
                let job = joined.map_err(|e| anyhow::anyhow!("Job task failed: {}", e))?;
                workflow.jobs.insert(job.id.clone(), job);
            }
            workflow.refresh_counts();
        }

        let status = if workflow.jobs.values().any(|j| j.state.is_failed()) {
            workflow.state.fail();
            ExecutionStatus::Failed
        } else {
            workflow.state.complete();
            ExecutionStatus::Completed
        };

        info!(workflow = %workflow.name, ?status, "run finished");
        self.events.emit(ExecutionEvent::RunCompleted { run_id, status });

        Ok(status)
    }

    /// Skip pending jobs whose dependencies did not succeed
    fn skip_blocked(&self, workflow: &mut Workflow) {
        let blocked: Vec<(String, Vec<String>)> = workflow
            .blocked_jobs()
            .iter()
            .map(|j| (j.id.clone(), j.needs.clone()))
            .collect();

        for (job_id, needs) in blocked {
            let failed: Vec<String> = needs
                .into_iter()
                .filter(|dep| workflow.job(dep).map(|d| !d.state.succeeded()).unwrap_or(true))
                .collect();
            let reason = format!("dependency did not succeed: {}", failed.join(", "));

            if let Some(job) = workflow.job_mut(&job_id) {
                info!(job = %job_id, %reason, "skipping job");
                job.state = JobState::Skipped {
                    reason: reason.clone(),
                };
                job.skip_remaining(&reason);
            }
            self.events.emit(ExecutionEvent::JobSkipped { job_id, reason });
        }
        workflow.refresh_counts();
    }
}
