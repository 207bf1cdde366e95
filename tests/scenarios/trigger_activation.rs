//! Test: Trigger activation - which events start a run

use crate::helpers::*;
use cirun::core::{ExecutionStatus, RepositoryEvent, StepState};
use cirun::execution::ExecutionEvent;

#[tokio::test]
async fn test_push_to_main_activates() {
    let run = run_workflow(RUST_CI, RepositoryEvent::push("refs/heads/main"), ScriptedRunner::new()).await;

    assert_run_status(&run, ExecutionStatus::Completed);
    assert_eq!(run.calls.len(), 7);
}

#[tokio::test]
async fn test_pull_request_into_main_activates() {
    let run = run_workflow(RUST_CI, RepositoryEvent::pull_request("main"), ScriptedRunner::new()).await;

    assert_run_status(&run, ExecutionStatus::Completed);
    assert_eq!(run.calls.len(), 7);
    assert!(run
        .calls
        .iter()
        .all(|c| c.env.get("CIRUN_EVENT_NAME").map(String::as_str) == Some("pull_request")));
}

#[tokio::test]
async fn test_push_to_other_branch_is_ignored() {
    let run = run_workflow(
        RUST_CI,
        RepositoryEvent::push("refs/heads/feature/faster-builds"),
        ScriptedRunner::new(),
    )
    .await;

    assert_run_status(&run, ExecutionStatus::Ignored);
    assert!(run.calls.is_empty(), "no step may run for an ignored event");
    assert!(run
        .workflow
        .jobs
        .values()
        .flat_map(|j| j.steps.iter())
        .all(|s| matches!(s.state, StepState::Pending)));

    match run.events.as_slice() {
        [ExecutionEvent::RunIgnored { reason, .. }] => assert!(reason.contains("feature/faster-builds")),
        other => panic!("expected a single RunIgnored event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_pull_request_into_other_branch_is_ignored() {
    let run = run_workflow(RUST_CI, RepositoryEvent::pull_request("develop"), ScriptedRunner::new()).await;

    assert_run_status(&run, ExecutionStatus::Ignored);
    assert!(run.calls.is_empty());
}

#[tokio::test]
async fn test_tag_push_is_ignored_by_branch_filter() {
    let run = run_workflow(RUST_CI, RepositoryEvent::push("refs/tags/v1.0.0"), ScriptedRunner::new()).await;

    assert_run_status(&run, ExecutionStatus::Ignored);
    assert!(run.calls.is_empty());
}

#[tokio::test]
async fn test_branch_patterns_and_ignores() {
    let yaml = r#"
name: Releases
on:
  push:
    branches: [ "main", "release/**" ]
  pull_request:
    branches-ignore: [ "wip/*" ]
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: cargo build
"#;

    let run = run_workflow(yaml, RepositoryEvent::push("release/2024/q3"), ScriptedRunner::new()).await;
    assert_run_status(&run, ExecutionStatus::Completed);

    let run = run_workflow(yaml, RepositoryEvent::push("releases"), ScriptedRunner::new()).await;
    assert_run_status(&run, ExecutionStatus::Ignored);

    let run = run_workflow(yaml, RepositoryEvent::pull_request("wip/parser"), ScriptedRunner::new()).await;
    assert_run_status(&run, ExecutionStatus::Ignored);

    let run = run_workflow(yaml, RepositoryEvent::pull_request("develop"), ScriptedRunner::new()).await;
    assert_run_status(&run, ExecutionStatus::Completed);
}

#[tokio::test]
async fn test_unlisted_event_is_ignored() {
    let yaml = r#"
name: Push only
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: cargo build
"#;

    let run = run_workflow(yaml, RepositoryEvent::pull_request("main"), ScriptedRunner::new()).await;
    assert_run_status(&run, ExecutionStatus::Ignored);

    let run = run_workflow(yaml, RepositoryEvent::push("any-branch"), ScriptedRunner::new()).await;
    assert_run_status(&run, ExecutionStatus::Completed);
}
