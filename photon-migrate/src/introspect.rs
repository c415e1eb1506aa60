//! Reading a datamodel back from a live database.

use std::path::{Path, PathBuf};
use std::time::Duration;

use photon_engine::config::{ENGINE_VERSION, default_cache_dir};
use photon_engine::env::INTROSPECTION_ENGINE_BINARY_VAR;
use photon_engine::{EnvSource, StdEnvSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::MigrateResult;
use crate::jsonrpc::Request;
use crate::locate::{INTROSPECTION_ENGINE_PREFIX, locate};
use crate::stdio::{Invocation, call};

/// Deadline for an `introspect` call.
pub const INTROSPECT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectParams<'a> {
    schema: &'a str,
    composite_type_depth: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectOutcome {
    data_model: String,
    #[serde(default)]
    version: Option<String>,
}

/// Handle to the introspection engine executable.
#[derive(Debug, Clone)]
pub struct IntrospectionEngine {
    binary: PathBuf,
    timeout: Duration,
}

impl IntrospectionEngine {
    /// Locate the engine from the process environment and default cache.
    pub fn new() -> MigrateResult<Self> {
        Self::from_env_source(&StdEnvSource)
    }

    /// Locate the engine using `env` for the override variable.
    pub fn from_env_source<S: EnvSource + ?Sized>(env: &S) -> MigrateResult<Self> {
        let cache = default_cache_dir(ENGINE_VERSION);
        let binary = locate(
            INTROSPECTION_ENGINE_BINARY_VAR,
            INTROSPECTION_ENGINE_PREFIX,
            env,
            Path::new("."),
            cache.as_deref(),
        )?;
        Ok(Self::with_binary(binary))
    }

    /// Use a known executable.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: INTROSPECT_TIMEOUT,
        }
    }

    /// Override the call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path of the executable.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Introspect the database named by the datasource in `schema`.
    ///
    /// Returns the datamodel text describing the live database.
    pub async fn pull(&self, schema: &str) -> MigrateResult<String> {
        let invocation = Invocation {
            engine: "introspection-engine",
            binary: self.binary.clone(),
            args: Vec::new(),
            deadline: self.timeout,
        };
        debug!(schema_len = schema.len(), "introspecting");

        let params = [IntrospectParams {
            schema,
            composite_type_depth: -1,
        }];
        let outcome: IntrospectOutcome = call(&invocation, &Request::new("introspect", params)).await?;

        info!(version = outcome.version.as_deref().unwrap_or("unknown"), "introspection done");
        Ok(outcome.data_model)
    }
}
