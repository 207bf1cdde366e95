//! Test: Step ordering - canonical Rust CI sequence

use crate::helpers::*;
use cirun::core::{ExecutionStatus, RepositoryEvent, StepKind};
use cirun::execution::ExecutionEvent;

#[tokio::test]
async fn test_canonical_sequence() {
    let run = run_workflow(RUST_CI, RepositoryEvent::push("main"), ScriptedRunner::new()).await;

    assert_run_status(&run, ExecutionStatus::Completed);
    assert!(run.calls.iter().all(|c| c.attempt == Some(1)));
    assert_eq!(
        run.kinds_run(),
        vec![
            StepKind::Checkout,
            StepKind::ToolchainSetup,
            StepKind::CacheSetup,
            StepKind::FormatCheck,
            StepKind::Build,
            StepKind::Test,
            StepKind::Lint,
        ]
    );
}

#[tokio::test]
async fn test_canonical_commands_cover_all_targets() {
    let run = run_workflow(RUST_CI, RepositoryEvent::push("main"), ScriptedRunner::new()).await;

    let command = |name: &str| run.calls_for(name)[0].command.clone().unwrap_or_default();
    assert_eq!(command("Check formatting"), "cargo fmt --all -- --check");
    assert!(command("Build").contains("--all-targets"));

    let test = command("Run tests");
    assert!(test.contains("--workspace") && test.contains("--all-targets"), "{}", test);

    let lint = command("Clippy");
    assert!(lint.contains("--all-features"), "{}", lint);
    assert!(lint.ends_with("-- -D warnings"), "{}", lint);
}

#[tokio::test]
async fn test_each_step_finishes_before_the_next_starts() {
    let run = run_workflow(RUST_CI, RepositoryEvent::push("main"), ScriptedRunner::new()).await;

    let mut running: Option<usize> = None;
    let mut finished = Vec::new();
    for event in &run.events {
        match event {
            ExecutionEvent::StepStarted { step_index, .. } => {
                assert!(running.is_none(), "step {} started while another was running", step_index);
                running = Some(*step_index);
            }
            ExecutionEvent::StepCompleted { step_index, .. } => {
                assert_eq!(running.take(), Some(*step_index));
                finished.push(*step_index);
            }
            _ => {}
        }
    }
    assert_eq!(finished, (0..7).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_declared_order_is_kept_for_custom_steps() {
    let yaml = r#"
name: Custom
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: cargo clippy -- -D warnings
      - run: echo "between"
      - run: cargo build
"#;

    let run = run_workflow(yaml, RepositoryEvent::push("main"), ScriptedRunner::new()).await;

    assert_run_status(&run, ExecutionStatus::Completed);
    assert_eq!(
        run.kinds_run(),
        vec![StepKind::Lint, StepKind::Command, StepKind::Build]
    );
}
