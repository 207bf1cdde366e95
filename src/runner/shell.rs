//! Shell and subprocess execution

use crate::runner::outcome::{RunnerError, StepOutput};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs inline `run` scripts
#[derive(Debug, Clone)]
pub struct ShellRunner {
    /// Default shell command line; the script is appended as the last argument
    default_shell: Vec<String>,
}

impl ShellRunner {
    pub fn new(default_shell: Vec<String>) -> Self {
        Self { default_shell }
    }

    /// Command line for a step's `shell` setting
    ///
    /// `bash` and `sh` get fail-fast flags. A template containing `{0}` has
    /// the placeholder replaced by a script file path. Anything else is split
    /// on whitespace and gets the script as its last argument.
    pub fn command_line(&self, shell: Option<&str>) -> Vec<String> {
        let words = |s: &[&str]| s.iter().map(|w| w.to_string()).collect::<Vec<_>>();
        match shell.map(str::trim) {
            None | Some("") => self.default_shell.clone(),
            Some("bash") => words(&["bash", "--noprofile", "--norc", "-eo", "pipefail", "-c"]),
            Some("sh") => words(&["sh", "-e", "-c"]),
            Some("python") => words(&["python3", "-c"]),
            Some(custom) => custom.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// Run a script in `cwd` with exactly the given environment
    pub async fn run_script(
        &self,
        script: &str,
        shell: Option<&str>,
        cwd: &Path,
        env: &HashMap<String, String>,
        scratch: &Path,
    ) -> Result<StepOutput, RunnerError> {
        let mut line = self.command_line(shell);
        if line.is_empty() {
            return Err(RunnerError::Internal("empty shell command line".to_string()));
        }

        if line.iter().any(|w| w.contains("{0}")) {
            let file = scratch.join(format!("script-{}", uuid::Uuid::new_v4()));
            tokio::fs::write(&file, script).await?;
            let file = file.display().to_string();
            for word in &mut line {
                *word = word.replace("{0}", &file);
            }
        } else {
            line.push(script.to_string());
        }

        let program = line.remove(0);
        run_process(&program, &line, cwd, env).await
    }
}

/// Spawn a process with a clean environment and capture its output
///
/// The child is killed if the returned future is dropped (e.g. on timeout).
pub async fn run_process(
    program: &str,
    args: &[String],
    cwd: &Path,
    env: &HashMap<String, String>,
) -> Result<StepOutput, RunnerError> {
    if !cwd.is_dir() {
        return Err(RunnerError::Workspace(format!(
            "working directory {} does not exist",
            cwd.display()
        )));
    }

    debug!(program, ?args, cwd = %cwd.display(), "spawning process");
    let started = Instant::now();

    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .env_clear()
        .envs(env)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| RunnerError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    if exit_code != 0 {
        warn!(program, exit_code, "process exited with failure");
    }

    Ok(StepOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration_ms: started.elapsed().as_millis() as u64,
        ..Default::default()
    })
}
