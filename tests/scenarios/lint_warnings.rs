//! Test: Lint warnings - any warning reported by the linter fails the run

use crate::helpers::*;
use cirun::core::{ExecutionStatus, RepositoryEvent, StepKind};
use cirun::runner::StepOutput;

const CLIPPY_WARNING: &str = "\
    Checking cirun v0.1.0 (/work/cirun)
warning: unused variable: `count`
 --> src/lib.rs:12:9
   |
12 |     let count = 0;
   |         ^^^^^ help: if this is intentional, prefix it with an underscore: `_count`
   |
warning: `cirun` (lib) generated 1 warning
    Finished `dev` profile [unoptimized + debuginfo] target(s) in 0.52s
";

#[tokio::test]
async fn test_lint_warning_fails_run_even_with_zero_exit() {
    let runner = ScriptedRunner::new().reply(Match::Kind(StepKind::Lint), StepOutput {
        exit_code: 0,
        stderr: CLIPPY_WARNING.to_string(),
        ..Default::default()
    });

    let run = run_workflow(RUST_CI, RepositoryEvent::push("main"), runner).await;

    assert_run_status(&run, ExecutionStatus::Failed);
    assert_step_failed(&run, "build", "Clippy", "1 warning");
    assert_step_completed(&run, "build", "Run tests");
}

#[tokio::test]
async fn test_clean_lint_passes() {
    let runner = ScriptedRunner::new().reply(
        Match::Kind(StepKind::Lint),
        StepOutput {
            exit_code: 0,
            stderr: "    Checking cirun v0.1.0\n    Finished `dev` profile in 0.40s\n".to_string(),
            ..Default::default()
        },
    );

    let run = run_workflow(RUST_CI, RepositoryEvent::push("main"), runner).await;

    assert_run_status(&run, ExecutionStatus::Completed);
    assert_step_completed(&run, "build", "Clippy");
}

#[tokio::test]
async fn test_lint_denied_warning_fails_by_exit_code() {
    let runner = ScriptedRunner::new().reply(
        Match::Kind(StepKind::Lint),
        StepOutput::failed(101, "error: unused variable: `count`\nerror: could not compile `cirun`"),
    );

    let run = run_workflow(RUST_CI, RepositoryEvent::push("main"), runner).await;

    assert_run_status(&run, ExecutionStatus::Failed);
    assert_step_failed(&run, "build", "Clippy", "exited with code 101");
}

#[tokio::test]
async fn test_build_warnings_do_not_fail_build() {
    let runner = ScriptedRunner::new().reply(
        Match::Kind(StepKind::Build),
        StepOutput {
            exit_code: 0,
            stderr: CLIPPY_WARNING.to_string(),
            ..Default::default()
        },
    );

    let run = run_workflow(RUST_CI, RepositoryEvent::push("main"), runner).await;

    assert_run_status(&run, ExecutionStatus::Completed);
    assert_step_completed(&run, "build", "Build");
}
