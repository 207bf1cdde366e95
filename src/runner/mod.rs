//! Step runners - the seam that actually executes a step

pub mod actions;
pub mod outcome;
pub mod shell;

use crate::cache::CompileCache;
use crate::core::{
    context::JobContext,
    step::{Step, StepAction, StepKind},
};
use crate::settings::RunnerSettings;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

pub use outcome::{RunnerError, StepOutput};
pub use shell::ShellRunner;

/// Trait for step execution - allows for different implementations
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run one step with its effective environment
    ///
    /// A non-zero `exit_code` is a step failure; `Err` means the step could
    /// not be run at all.
    async fn run_step(
        &self,
        step: &Step,
        env: &HashMap<String, String>,
        ctx: &JobContext,
    ) -> Result<StepOutput, RunnerError>;
}

/// Runs steps on the local host
#[derive(Debug, Clone)]
pub struct LocalRunner {
    shell: ShellRunner,
    cache: CompileCache,
}

impl LocalRunner {
    pub fn new(shell: ShellRunner, cache: CompileCache) -> Self {
        Self { shell, cache }
    }

    pub fn from_settings(settings: &RunnerSettings) -> Self {
        Self::new(
            ShellRunner::new(settings.shell.clone()),
            CompileCache::new(settings.cache.clone()),
        )
    }
}

#[async_trait]
impl StepRunner for LocalRunner {
    async fn run_step(
        &self,
        step: &Step,
        env: &HashMap<String, String>,
        ctx: &JobContext,
    ) -> Result<StepOutput, RunnerError> {
        match &step.action {
            StepAction::Run {
                shell,
                working_directory,
                ..
            } => {
                let script = step.render_command(env).unwrap_or_default();
                let cwd = match working_directory {
                    Some(dir) => ctx.workspace.join(crate::core::step::substitute_env(dir, env)),
                    None => ctx.workspace.clone(),
                };
                debug!(step = %step.name, cwd = %cwd.display(), "running script");
                self.shell
                    .run_script(&script, shell.as_deref(), &cwd, env, ctx.scratch_dir())
                    .await
            }
            StepAction::Uses { action, .. } => {
                let inputs = step.render_inputs(env);
                match step.kind {
                    StepKind::Checkout => actions::checkout(&inputs, env, ctx).await,
                    StepKind::ToolchainSetup => {
                        actions::setup_toolchain(action, &inputs, env, ctx).await
                    }
                    StepKind::CacheSetup => actions::setup_cache(&self.cache, env, ctx).await,
                    _ => Err(RunnerError::UnsupportedAction(action.to_string())),
                }
            }
        }
    }
}
