//! Test: Environment propagation - workflow, job and step bindings

use crate::helpers::*;
use cirun::core::{ExecutionStatus, RepositoryEvent};
use cirun::runner::StepOutput;

const LAYERED: &str = r#"
name: Layers
on: push
env:
  PROFILE: workflow
  CARGO_TERM_COLOR: always
  RUST_BACKTRACE: 1
jobs:
  build:
    runs-on: ubuntu-latest
    env:
      PROFILE: job
      FEATURES: full
    steps:
      - name: Show
        run: echo "${{ env.PROFILE }} ${{ env.FEATURES }}"
      - name: Build
        run: cargo build --features ${{ env.FEATURES }}
        env:
          PROFILE: step-${{ env.PROFILE }}
"#;

fn var<'a>(call: &'a Invocation, key: &str) -> Option<&'a str> {
    call.env.get(key).map(String::as_str)
}

#[tokio::test]
async fn test_job_env_overrides_workflow_env() {
    let run = run_workflow(LAYERED, RepositoryEvent::push("main"), ScriptedRunner::new()).await;

    assert_run_status(&run, ExecutionStatus::Completed);
    let show = run.calls_for("Show")[0];
    assert_eq!(var(show, "PROFILE"), Some("job"));
    assert_eq!(var(show, "CARGO_TERM_COLOR"), Some("always"));
    assert_eq!(var(show, "RUST_BACKTRACE"), Some("1"));
    assert_eq!(show.command.as_deref(), Some("echo \"job full\""));
}

#[tokio::test]
async fn test_step_env_overrides_job_env() {
    let run = run_workflow(LAYERED, RepositoryEvent::push("main"), ScriptedRunner::new()).await;

    let build = run.calls_for("Build")[0];
    assert_eq!(var(build, "PROFILE"), Some("step-job"));
    assert_eq!(build.command.as_deref(), Some("cargo build --features full"));
}

#[tokio::test]
async fn test_runner_variables_are_set() {
    let run = run_workflow(
        LAYERED,
        RepositoryEvent::push("main").with_sha("4f2a9c1"),
        ScriptedRunner::new(),
    )
    .await;

    let show = run.calls_for("Show")[0];
    assert_eq!(var(show, "CI"), Some("true"));
    assert_eq!(var(show, "CIRUN_JOB"), Some("build"));
    assert_eq!(var(show, "CIRUN_EVENT_NAME"), Some("push"));
    assert_eq!(var(show, "CIRUN_REF"), Some("refs/heads/main"));
    assert_eq!(var(show, "CIRUN_SHA"), Some("4f2a9c1"));
    assert_eq!(var(show, "CIRUN_RUNNER"), Some("ubuntu-latest"));
    assert_eq!(
        var(show, "CIRUN_RUN_ID").map(str::to_string),
        Some(run.workflow.state.run_id.to_string())
    );
}

const EXPORTS: &str = r#"
name: Exports
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - name: First
        run: echo first
      - name: Export
        run: echo "MSRV=1.75" >> "$CIRUN_ENV"
      - name: Use
        run: cargo +${{ env.MSRV }} build
"#;

#[tokio::test]
async fn test_exports_reach_later_steps_only() {
    let runner = ScriptedRunner::new().writes_env(Match::Command("CIRUN_ENV"), "MSRV=1.75");

    let run = run_workflow(EXPORTS, RepositoryEvent::push("main"), runner).await;

    assert_run_status(&run, ExecutionStatus::Completed);
    assert_eq!(var(run.calls_for("First")[0], "MSRV"), None);
    assert_eq!(var(run.calls_for("Export")[0], "MSRV"), None);

    let used = run.calls_for("Use")[0];
    assert_eq!(var(used, "MSRV"), Some("1.75"));
    assert_eq!(used.command.as_deref(), Some("cargo +1.75 build"));
}

#[tokio::test]
async fn test_exported_value_with_shift_operator() {
    let runner = ScriptedRunner::new().writes_env(Match::Command("CIRUN_ENV"), "MSRV=1<<2");

    let run = run_workflow(EXPORTS, RepositoryEvent::push("main"), runner).await;

    assert_run_status(&run, ExecutionStatus::Completed);
    assert_step_completed(&run, "build", "Export");
    assert_eq!(var(run.calls_for("Use")[0], "MSRV"), Some("1<<2"));
}

#[tokio::test]
async fn test_failed_step_exports_are_discarded() {
    let yaml = r#"
name: Exports
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - name: Export
        run: cargo metadata
        continue-on-error: true
      - name: Use
        run: cargo build
"#;

    let runner = ScriptedRunner::new().reply(
        Match::Command("cargo metadata"),
        StepOutput::failed(1, "no Cargo.toml").with_export("LEAK", "yes"),
    );

    let run = run_workflow(yaml, RepositoryEvent::push("main"), runner).await;

    assert_run_status(&run, ExecutionStatus::Completed);
    assert_eq!(var(run.calls_for("Use")[0], "LEAK"), None);
}
