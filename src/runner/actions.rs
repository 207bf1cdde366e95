//! Built-in implementations of the well-known setup actions

use crate::cache::{self, CacheKey, CacheStatus, CompileCache};
use crate::core::{context::JobContext, step::ActionRef};
use crate::runner::outcome::{RunnerError, StepOutput};
use crate::runner::shell::run_process;
use crate::settings::CheckoutMode;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// Populate the workspace with the sources
pub async fn checkout(
    inputs: &BTreeMap<String, String>,
    env: &HashMap<String, String>,
    ctx: &JobContext,
) -> Result<StepOutput, RunnerError> {
    match &ctx.checkout {
        CheckoutMode::InPlace => {
            if !ctx.workspace.is_dir() {
                return Err(RunnerError::Workspace(format!(
                    "workspace {} does not exist",
                    ctx.workspace.display()
                )));
            }
            Ok(StepOutput::ok(format!(
                "Using workspace {} in place",
                ctx.workspace.display()
            )))
        }
        CheckoutMode::Clone { source } => {
            let workspace = ctx.workspace.display().to_string();
            let parent = ctx.scratch_dir();

            let mut args = vec!["clone".to_string(), "--quiet".to_string()];
            if let Some(depth) = inputs.get("fetch-depth").filter(|d| d.as_str() != "0") {
                args.push(format!("--depth={}", depth));
                // --depth ignores local paths without this
                args.push("--no-local".to_string());
            }
            args.push(source.clone());
            args.push(workspace.clone());

            info!(source = %source, workspace = %workspace, "cloning sources");
            let clone = run_process("git", &args, parent, env).await?;
            if !clone.success() {
                return Ok(clone);
            }

            let target = inputs
                .get("ref")
                .filter(|r| !r.is_empty())
                .cloned()
                .or_else(|| ctx.event.sha.clone());
            let Some(target) = target else {
                return Ok(StepOutput::ok(format!("Cloned {} into {}", source, workspace)));
            };

            let args = vec!["checkout".to_string(), "--quiet".to_string(), target.clone()];
            let mut checkout = run_process("git", &args, &ctx.workspace, env).await?;
            if checkout.success() {
                checkout.stdout = format!("Cloned {} and checked out {}", source, target);
            }
            Ok(checkout)
        }
    }
}

/// Toolchain requested by a toolchain action
///
/// `with.toolchain` wins; otherwise `dtolnay/rust-toolchain@<channel>` names
/// the channel in its version, and everything else defaults to stable.
pub fn requested_toolchain(action: &ActionRef, inputs: &BTreeMap<String, String>) -> String {
    if let Some(toolchain) = inputs.get("toolchain").filter(|t| !t.trim().is_empty()) {
        return toolchain.trim().to_string();
    }
    let version = action.version.as_str();
    let is_channel = matches!(version, "stable" | "beta" | "nightly")
        || version.starts_with("nightly-")
        || version.starts_with(|c: char| c.is_ascii_digit());
    if action.repository() == "dtolnay/rust-toolchain" && is_channel {
        version.to_string()
    } else {
        "stable".to_string()
    }
}

fn list_input(inputs: &BTreeMap<String, String>, key: &str) -> Vec<String> {
    inputs
        .get(key)
        .map(|raw| {
            raw.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Install the toolchain through rustup and select it for later steps
pub async fn setup_toolchain(
    action: &ActionRef,
    inputs: &BTreeMap<String, String>,
    env: &HashMap<String, String>,
    ctx: &JobContext,
) -> Result<StepOutput, RunnerError> {
    let toolchain = requested_toolchain(action, inputs);

    let mut args = vec![
        "toolchain".to_string(),
        "install".to_string(),
        toolchain.clone(),
        "--profile".to_string(),
        "minimal".to_string(),
        "--no-self-update".to_string(),
    ];
    for component in list_input(inputs, "components") {
        args.push("--component".to_string());
        args.push(component);
    }
    for target in list_input(inputs, "targets").into_iter().chain(list_input(inputs, "target")) {
        args.push("--target".to_string());
        args.push(target);
    }

    info!(toolchain = %toolchain, "installing toolchain");
    let output = run_process("rustup", &args, &ctx.workspace, env).await?;
    if !output.success() {
        return Ok(output);
    }

    Ok(output.with_export("RUSTUP_TOOLCHAIN", toolchain))
}

/// Probe the cache wrapper and export its bindings
///
/// An unavailable wrapper is reported as a failed output, not an error; the
/// executor degrades the step.
pub async fn setup_cache(
    cache: &CompileCache,
    env: &HashMap<String, String>,
    ctx: &JobContext,
) -> Result<StepOutput, RunnerError> {
    match cache.probe(env).await {
        CacheStatus::Ready { wrapper, version } => {
            let toolchain = env
                .get("RUSTUP_TOOLCHAIN")
                .map(String::as_str)
                .unwrap_or("default");
            let key = CacheKey::compute(&ctx.workspace, toolchain, &ctx.runner_label);
            let mut output = StepOutput::ok(format!("{} ready (key {})", version, key));
            output.exports = cache::exports(&wrapper, &key);
            Ok(output)
        }
        CacheStatus::Unavailable { reason } => {
            warn!(reason = %reason, "compilation cache unavailable");
            Ok(StepOutput::failed(1, reason))
        }
    }
}
