//! Test: Job dependencies - `needs` ordering and skipping

use crate::helpers::*;
use cirun::core::{state::JobState, ExecutionStatus, RepositoryEvent};
use cirun::execution::{ExecutionEvent, SchedulingStrategy};
use cirun::runner::StepOutput;

const CHAIN: &str = r#"
name: Chain
on: push
jobs:
  test:
    runs-on: ubuntu-latest
    needs: build
    steps:
      - name: Test
        run: cargo test
  build:
    runs-on: ubuntu-latest
    steps:
      - name: Build
        run: cargo build
  package:
    runs-on: ubuntu-latest
    needs: [build, test]
    steps:
      - name: Package
        run: cargo package --allow-dirty
"#;

#[tokio::test]
async fn test_needs_orders_jobs() {
    let run = run_workflow(CHAIN, RepositoryEvent::push("main"), ScriptedRunner::new()).await;

    assert_run_status(&run, ExecutionStatus::Completed);
    assert_eq!(run.jobs_run(), vec!["build", "test", "package"]);
    assert_eq!(run.workflow.job_order(), ["build", "test", "package"]);
}

#[tokio::test]
async fn test_failed_dependency_skips_dependents() {
    let runner = ScriptedRunner::new().reply(Match::Command("cargo build"), StepOutput::failed(101, "error: could not compile"));

    let run = run_workflow(CHAIN, RepositoryEvent::push("main"), runner).await;

    assert_run_status(&run, ExecutionStatus::Failed);
    assert_eq!(run.jobs_run(), vec!["build"]);
    for job_id in ["test", "package"] {
        let job = run.workflow.job(job_id).unwrap();
        assert!(matches!(job.state, JobState::Skipped { .. }), "{} should be skipped", job_id);
    }
    assert_step_skipped(&run, "test", "Test");
    assert!(run
        .events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::JobSkipped { job_id, .. } if job_id == "package")));
}

#[tokio::test]
async fn test_independent_job_still_runs_after_failure() {
    let yaml = r#"
name: Independent
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - name: Build
        run: cargo build
  docs:
    runs-on: ubuntu-latest
    steps:
      - name: Docs
        run: cargo doc --no-deps
"#;

    let runner = ScriptedRunner::new().reply(Match::Command("cargo build"), StepOutput::failed(1, "boom"));
    let run = run_workflow_with(yaml, RepositoryEvent::push("main"), runner, SchedulingStrategy::LimitedParallel(2)).await;

    assert_run_status(&run, ExecutionStatus::Failed);
    assert_step_completed(&run, "docs", "Docs");
    assert!(run.workflow.job("docs").unwrap().state.succeeded());
}

#[tokio::test]
async fn test_unknown_runner_label_fails_job_without_running_steps() {
    let yaml = r#"
name: Windows
on: push
jobs:
  build:
    runs-on: windows-latest
    steps:
      - name: Build
        run: cargo build
"#;

    let run = run_workflow(yaml, RepositoryEvent::push("main"), ScriptedRunner::new()).await;

    assert_run_status(&run, ExecutionStatus::Failed);
    assert!(run.calls.is_empty());
    match &run.workflow.job("build").unwrap().state {
        JobState::Failed { error, .. } => assert!(error.contains("windows-latest")),
        other => panic!("expected failed job, got {:?}", other),
    }
    assert_step_skipped(&run, "build", "Build");
}
