//! Scenario tests: whole workflow runs against a scripted step runner

mod helpers;

mod env_propagation;
mod job_dependencies;
mod lint_warnings;
mod run_isolation;
mod step_ordering;
mod trigger_activation;
mod validation;
