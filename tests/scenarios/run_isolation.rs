//! Test: Run isolation - runs and jobs share no environment state

use crate::helpers::*;
use cirun::core::{ExecutionStatus, RepositoryEvent};
use cirun::execution::{ExecutionEngine, SchedulingStrategy};
use cirun::runner::StepOutput;
use std::path::Path;

const EXPORTING: &str = r#"
name: Isolation
on:
  push:
  pull_request:
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - name: Probe
        run: env
      - name: Export
        run: cargo build
"#;

#[tokio::test]
async fn test_runs_from_unrelated_events_share_nothing() {
    let runner = ScriptedRunner::new().reply(
        Match::Command("cargo build"),
        StepOutput::ok("built").with_export("LEAKED_FROM_RUN", "first"),
    );
    let calls = runner.calls();
    let engine = ExecutionEngine::new(runner, test_settings(), SchedulingStrategy::Sequential);

    let mut first = load(EXPORTING);
    let status = engine.execute(&mut first, &RepositoryEvent::push("main")).await.unwrap();
    assert_eq!(status, ExecutionStatus::Completed);

    let mut second = load(EXPORTING);
    let status = engine
        .execute(&mut second, &RepositoryEvent::pull_request("develop"))
        .await
        .unwrap();
    assert_eq!(status, ExecutionStatus::Completed);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 4);
    let (run1_probe, run2_probe) = (&calls[0], &calls[2]);

    assert!(run2_probe.env.get("LEAKED_FROM_RUN").is_none());
    assert_ne!(run1_probe.env.get("CIRUN_RUN_ID"), run2_probe.env.get("CIRUN_RUN_ID"));
    assert_ne!(run1_probe.env.get("CIRUN_ENV"), run2_probe.env.get("CIRUN_ENV"));
    assert_eq!(
        run2_probe.env.get("CIRUN_EVENT_NAME").map(String::as_str),
        Some("pull_request")
    );
}

#[tokio::test]
async fn test_scratch_space_is_removed_after_the_job() {
    let run = run_workflow(EXPORTING, RepositoryEvent::push("main"), ScriptedRunner::new()).await;

    let env_file = run.calls[0].env.get("CIRUN_ENV").expect("CIRUN_ENV set");
    let scratch = Path::new(env_file).parent().expect("env file has a parent");
    assert!(!scratch.exists(), "{} should be gone", scratch.display());
}

#[tokio::test]
async fn test_jobs_in_one_run_do_not_share_exports() {
    let yaml = r#"
name: Two jobs
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - name: Export
        run: cargo build
  docs:
    runs-on: ubuntu-latest
    needs: build
    steps:
      - name: Docs
        run: cargo doc
"#;

    let runner = ScriptedRunner::new().reply(
        Match::Command("cargo build"),
        StepOutput::ok("").with_export("FROM_BUILD", "1"),
    );
    let run = run_workflow(yaml, RepositoryEvent::push("main"), runner).await;

    assert_run_status(&run, ExecutionStatus::Completed);
    let docs = run.calls_for("Docs")[0];
    assert!(docs.env.get("FROM_BUILD").is_none());
    assert_ne!(docs.env.get("CIRUN_ENV"), run.calls_for("Export")[0].env.get("CIRUN_ENV"));
}

#[tokio::test]
async fn test_parallel_jobs_get_their_own_context() {
    let yaml = r#"
name: Matrix-ish
on: push
jobs:
  stable:
    runs-on: ubuntu-latest
    env:
      TOOLCHAIN: stable
    steps:
      - name: Build stable
        run: cargo build
  nightly:
    runs-on: ubuntu-latest
    env:
      TOOLCHAIN: nightly
    steps:
      - name: Build nightly
        run: cargo build
"#;

    let run = run_workflow_with(
        yaml,
        RepositoryEvent::push("main"),
        ScriptedRunner::new(),
        SchedulingStrategy::Parallel,
    )
    .await;

    assert_run_status(&run, ExecutionStatus::Completed);
    let stable = run.calls_for("Build stable")[0];
    let nightly = run.calls_for("Build nightly")[0];
    assert_eq!(stable.env.get("TOOLCHAIN").map(String::as_str), Some("stable"));
    assert_eq!(nightly.env.get("TOOLCHAIN").map(String::as_str), Some("nightly"));
    assert_ne!(stable.env.get("CIRUN_ENV"), nightly.env.get("CIRUN_ENV"));
}
