//! Compilation cache integration
//!
//! A cache wrapper (sccache by default) sits in front of `rustc` through
//! `RUSTC_WRAPPER`. Everything here is best effort: an unavailable wrapper
//! means compiles run uncached, never that the run fails.

pub mod key;

pub use key::CacheKey;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Wrapper used when `CIRUN_CACHE_WRAPPER` is not set
pub const DEFAULT_WRAPPER: &str = "sccache";

/// Seconds allowed for the wrapper probe
const PROBE_TIMEOUT_SECS: u64 = 10;

/// Compilation cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Wrapper program name or path
    pub wrapper: String,
    /// When false, cache setup steps always degrade
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            wrapper: std::env::var("CIRUN_CACHE_WRAPPER")
                .ok()
                .filter(|w| !w.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_WRAPPER.to_string()),
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Create a config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(wrapper: &str) -> Self {
        CacheConfig {
            wrapper: wrapper.to_string(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// File name of the wrapper (`/opt/bin/sccache` -> `sccache`)
    pub fn wrapper_name(&self) -> &str {
        Path::new(&self.wrapper)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.wrapper)
    }

    /// Whether a `RUSTC_WRAPPER` value refers to this wrapper
    pub fn points_at_wrapper(&self, value: &str) -> bool {
        let value = value.trim();
        value == self.wrapper
            || Path::new(value).file_name().and_then(|n| n.to_str()) == Some(self.wrapper_name())
    }
}

/// Result of probing the wrapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Ready { wrapper: PathBuf, version: String },
    Unavailable { reason: String },
}

impl CacheStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, CacheStatus::Ready { .. })
    }
}

/// Compiler cache wrapper handle
#[derive(Debug, Clone)]
pub struct CompileCache {
    config: CacheConfig,
}

impl CompileCache {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Check that the wrapper can be found on the step's `PATH` and runs
    pub async fn probe(&self, env: &HashMap<String, String>) -> CacheStatus {
        if !self.config.enabled {
            return CacheStatus::Unavailable {
                reason: "compilation cache disabled".to_string(),
            };
        }

        let Some(wrapper) = resolve_program(&self.config.wrapper, env.get("PATH").map(String::as_str))
        else {
            warn!(wrapper = %self.config.wrapper, "cache wrapper not found on PATH");
            return CacheStatus::Unavailable {
                reason: format!("'{}' not found on PATH", self.config.wrapper),
            };
        };

        debug!(wrapper = %wrapper.display(), "probing cache wrapper");
        let result = timeout(
            Duration::from_secs(PROBE_TIMEOUT_SECS),
            Command::new(&wrapper)
                .arg("--version")
                .env_clear()
                .envs(env)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Err(_) => CacheStatus::Unavailable {
                reason: format!("'{}' did not answer within {}s", wrapper.display(), PROBE_TIMEOUT_SECS),
            },
            Ok(Err(e)) => CacheStatus::Unavailable {
                reason: format!("failed to run '{}': {}", wrapper.display(), e),
            },
            Ok(Ok(output)) if !output.status.success() => CacheStatus::Unavailable {
                reason: format!(
                    "'{} --version' exited with {}: {}",
                    wrapper.display(),
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            },
            Ok(Ok(output)) => {
                let version = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                info!(wrapper = %wrapper.display(), %version, "cache wrapper ready");
                CacheStatus::Ready { wrapper, version }
            }
        }
    }
}

/// Bindings exported by a successful cache setup
pub fn exports(wrapper: &Path, key: &CacheKey) -> BTreeMap<String, String> {
    let mut exports = BTreeMap::new();
    exports.insert("RUSTC_WRAPPER".to_string(), wrapper.display().to_string());
    exports.insert("CARGO_INCREMENTAL".to_string(), "0".to_string());
    exports.insert("CIRUN_CACHE_KEY".to_string(), key.to_string());
    exports
}

/// Whether a failed compile was caused by the wrapper rather than the code
pub fn is_wrapper_failure(stderr: &str, wrapper_name: &str) -> bool {
    let wrapper_name = wrapper_name.to_lowercase();
    stderr.lines().any(|line| {
        let line = line.to_lowercase();
        line.contains(&wrapper_name)
            && (line.contains("error")
                || line.contains("failed")
                || line.contains("could not execute"))
    })
}

/// Find an executable on a `PATH` string; paths with a separator are used as-is
pub fn resolve_program(program: &str, path: Option<&str>) -> Option<PathBuf> {
    if program.contains('/') {
        let candidate = PathBuf::from(program);
        return candidate.is_file().then_some(candidate);
    }

    std::env::split_paths(path?)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
