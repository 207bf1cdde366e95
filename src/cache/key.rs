//! Cache key derivation

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Content-addressed key for a compilation cache scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// SHA-256 over the workspace `Cargo.lock`, the toolchain and the runner label
    ///
    /// A workspace without a lockfile hashes a fixed marker instead.
    pub fn compute(workspace: &Path, toolchain: &str, runner: &str) -> Self {
        let mut hasher = Sha256::new();

        match std::fs::read(workspace.join("Cargo.lock")) {
            Ok(lockfile) => hasher.update(&lockfile),
            Err(e) => {
                debug!(workspace = %workspace.display(), error = %e, "no Cargo.lock for cache key");
                hasher.update(b"<no-lockfile>");
            }
        }
        hasher.update(b"\0");
        hasher.update(toolchain.as_bytes());
        hasher.update(b"\0");
        hasher.update(runner.as_bytes());

        CacheKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
