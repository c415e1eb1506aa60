//! Engine executable lookup.
//!
//! Resolution order: explicit override, exact platform build in the working
//! directory, exact build in the cache, then the static build in either place.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::process::Command;
use tracing::debug;

use crate::config::EngineConfig;
use crate::env::QUERY_ENGINE_BINARY_VAR;
use crate::error::{EngineError, EngineResult};
use crate::platform::Platform;

/// File name prefix of query engine builds.
pub const QUERY_ENGINE_PREFIX: &str = "prisma-query-engine-";

/// An executable chosen for launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinary {
    /// Path to the executable.
    pub path: PathBuf,
    /// Whether it came from an explicit override.
    pub explicit: bool,
}

/// Finds the engine executable for a configuration.
pub trait BinaryLocator: Send + Sync + fmt::Debug {
    /// Resolve the executable to launch.
    fn locate(&self, config: &EngineConfig) -> EngineResult<ResolvedBinary>;
}

/// Pick the first existing file, honoring an override first.
///
/// A configured override that does not exist is an error; it never falls
/// through to the candidates.
pub fn resolve(
    override_var: &'static str,
    override_path: Option<&Path>,
    candidates: &[PathBuf],
) -> EngineResult<ResolvedBinary> {
    if let Some(path) = override_path {
        debug!(var = override_var, path = %path.display(), "using binary override");
        if !path.exists() {
            return Err(EngineError::OverrideMissing {
                var: override_var,
                path: path.to_path_buf(),
            });
        }
        return Ok(ResolvedBinary {
            path: path.to_path_buf(),
            explicit: true,
        });
    }

    for candidate in candidates {
        if candidate.is_file() {
            debug!(path = %candidate.display(), "engine binary found");
            return Ok(ResolvedBinary {
                path: candidate.clone(),
                explicit: false,
            });
        }
    }

    Err(EngineError::BinaryNotFound {
        searched: candidates.to_vec(),
    })
}

/// Looks for published engine builds on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsBinaryLocator {
    platform: Platform,
    prefix: String,
}

impl Default for FsBinaryLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl FsBinaryLocator {
    /// Locator for the host platform.
    pub fn new() -> Self {
        Self::with_platform(Platform::current().clone())
    }

    /// Locator for an explicit platform.
    pub fn with_platform(platform: Platform) -> Self {
        Self {
            platform,
            prefix: QUERY_ENGINE_PREFIX.to_string(),
        }
    }

    /// Use a different file name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Candidate paths in priority order.
    pub fn candidates(&self, working_dir: &Path, cache_dir: Option<&Path>) -> Vec<PathBuf> {
        let exact = self
            .platform
            .with_extension(format!("{}{}", self.prefix, self.platform.exact_name()));
        let generic = self
            .platform
            .with_extension(format!("{}{}", self.prefix, self.platform.static_name()));

        let mut paths = vec![working_dir.join(&exact)];
        if let Some(cache) = cache_dir {
            paths.push(cache.join(&exact));
        }
        if generic != exact {
            paths.push(working_dir.join(&generic));
            if let Some(cache) = cache_dir {
                paths.push(cache.join(&generic));
            }
        }
        paths
    }
}

impl BinaryLocator for FsBinaryLocator {
    fn locate(&self, config: &EngineConfig) -> EngineResult<ResolvedBinary> {
        let candidates = self.candidates(&config.working_dir, config.cache_dir.as_deref());
        resolve(
            QUERY_ENGINE_BINARY_VAR,
            config.binary_override.as_deref(),
            &candidates,
        )
    }
}

/// Extract the build hash from `--version` output such as `query-engine 5a92...`.
pub fn parse_version_output(output: &str) -> String {
    output.trim().replacen("query-engine", "", 1).trim().to_string()
}

/// Run `<binary> --version` and compare it with `expected`.
pub async fn check_version(binary: &Path, expected: &str) -> EngineResult<()> {
    let started = Instant::now();
    let output = Command::new(binary)
        .arg("--version")
        .output()
        .await
        .map_err(EngineError::Spawn)?;
    debug!(elapsed = ?started.elapsed(), "[timing] version check");

    let actual = parse_version_output(&String::from_utf8_lossy(&output.stdout));
    if actual != expected {
        return Err(EngineError::VersionMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
