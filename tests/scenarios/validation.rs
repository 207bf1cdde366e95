//! Test: Validation - malformed workflows are rejected before anything runs

use cirun::core::config::WorkflowConfig;

fn rejected(yaml: &str, expected: &str) {
    let err = match WorkflowConfig::from_yaml(yaml).and_then(|c| c.to_workflow()) {
        Ok(_) => panic!("workflow should have been rejected"),
        Err(e) => format!("{:#}", e),
    };
    assert!(err.contains(expected), "error '{}' should mention '{}'", err, expected);
}

#[test]
fn test_canonical_workflow_is_valid() {
    let config = WorkflowConfig::from_yaml(crate::helpers::RUST_CI).unwrap();
    let workflow = config.to_workflow().unwrap();

    assert_eq!(workflow.name, "Rust");
    assert_eq!(config.step_count(), 7);
    assert_eq!(workflow.env.get("RUSTC_WRAPPER").map(String::as_str), Some("sccache"));
    assert_eq!(workflow.job("build").unwrap().runner, vec!["ubuntu-latest"]);
}

#[test]
fn test_uses_and_run_together() {
    rejected(
        r#"
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - name: Both
        uses: actions/checkout@v4
        run: cargo build
"#,
        "sets both 'uses' and 'run'",
    );
}

#[test]
fn test_unknown_needs() {
    rejected(
        r#"
on: push
jobs:
  test:
    runs-on: ubuntu-latest
    needs: build
    steps:
      - run: cargo test
"#,
        "non-existent job 'build'",
    );
}

#[test]
fn test_dependency_cycle() {
    rejected(
        r#"
on: push
jobs:
  a:
    runs-on: ubuntu-latest
    needs: b
    steps: [{ run: "true" }]
  b:
    runs-on: ubuntu-latest
    needs: a
    steps: [{ run: "true" }]
"#,
        "Cycle detected",
    );
}

#[test]
fn test_bad_branch_pattern() {
    rejected(
        r#"
on:
  push:
    branches: [ "release/[0-9" ]
jobs:
  build:
    runs-on: ubuntu-latest
    steps: [{ run: cargo build }]
"#,
        "release/[0-9",
    );
}

#[test]
fn test_unsupported_condition() {
    rejected(
        r#"
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: cargo build
        if: github.event_name == 'push'
"#,
        "unsupported condition",
    );
}

#[test]
fn test_unsupported_event() {
    rejected(
        r#"
on:
  release:
    types: [published]
jobs:
  build:
    runs-on: ubuntu-latest
    steps: [{ run: cargo build }]
"#,
        "unsupported event 'release'",
    );
}
