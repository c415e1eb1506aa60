//! Schema push through the migration engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use photon_engine::config::{ENGINE_VERSION, default_cache_dir};
use photon_engine::env::MIGRATION_ENGINE_BINARY_VAR;
use photon_engine::{EnvSource, StdEnvSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MigrateError, MigrateResult};
use crate::jsonrpc::Request;
use crate::locate::{MIGRATION_ENGINE_PREFIX, locate};
use crate::stdio::{Invocation, call};

/// Deadline for a `schemaPush` call.
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(50);

#[derive(Debug, Serialize)]
struct PushParams<'a> {
    force: bool,
    schema: &'a str,
}

/// Outcome of a schema push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    /// Number of migration steps applied.
    #[serde(default)]
    pub executed_steps: u32,
    /// Warnings about potential data loss.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Steps the engine refused to run.
    #[serde(default)]
    pub unexecutable: Vec<String>,
}

/// Handle to the migration engine executable.
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    binary: PathBuf,
    timeout: Duration,
}

impl MigrationEngine {
    /// Locate the engine from the process environment and default cache.
    pub fn new() -> MigrateResult<Self> {
        Self::from_env_source(&StdEnvSource)
    }

    /// Locate the engine using `env` for the override variable.
    pub fn from_env_source<S: EnvSource + ?Sized>(env: &S) -> MigrateResult<Self> {
        let cache = default_cache_dir(ENGINE_VERSION);
        let binary = locate(
            MIGRATION_ENGINE_BINARY_VAR,
            MIGRATION_ENGINE_PREFIX,
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
            timeout: PUSH_TIMEOUT,
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

    /// Push the schema at `schema_path` to the database.
    ///
    /// With `force`, changes that lose data are applied anyway.
    pub async fn push(&self, schema_path: impl AsRef<Path>, force: bool) -> MigrateResult<PushOutcome> {
        let schema_path = schema_path.as_ref();
        let schema = tokio::fs::read_to_string(schema_path)
            .await
            .map_err(|source| MigrateError::ReadSchema {
                path: schema_path.to_path_buf(),
                source,
            })?;

        let invocation = Invocation {
            engine: "migration-engine",
            binary: self.binary.clone(),
            args: vec!["--datamodel".to_string(), schema_path.display().to_string()],
            deadline: self.timeout,
        };
        debug!(schema = %schema_path.display(), force, "pushing schema");

        let request = Request::new("schemaPush", PushParams { force, schema: &schema });
        let outcome: PushOutcome = call(&invocation, &request).await?;

        for warning in &outcome.warnings {
            warn!(%warning, "schema push warning");
        }
        info!(steps = outcome.executed_steps, "schema push done");
        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::fake_engine;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_push_reports_steps() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("schema.prisma");
        std::fs::write(&schema, "model User { id String @id }").unwrap();

        let binary = fake_engine(
            dir.path(),
            r#"[ "$1" = "--datamodel" ] || exit 3
read line
case "$line" in
  *'"method":"schemaPush"'*'"force":true'*) echo '{"jsonrpc":"2.0","result":{"executedSteps":2,"unexecutable":[],"warnings":["drops column"]},"id":1}' ;;
  *) echo '{"jsonrpc":"2.0","id":1,"error":{"code":1,"message":"bad request"}}' ;;
esac"#,
        );

        let outcome = MigrationEngine::with_binary(binary).push(&schema, true).await.unwrap();
        assert_eq!(
            outcome,
            PushOutcome {
                executed_steps: 2,
                warnings: vec!["drops column".into()],
                unexecutable: vec![],
            }
        );
    }

    #[tokio::test]
    async fn test_push_surfaces_engine_message() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("schema.prisma");
        std::fs::write(&schema, "model User {}").unwrap();

        let binary = fake_engine(
            dir.path(),
            r#"read line
echo '{"jsonrpc":"2.0","id":1,"error":{"code":4466,"message":"An error happened","data":{"is_panic":false,"message":"P1012: schema validation failed","meta":{}}}}'"#,
        );

        let err = MigrationEngine::with_binary(binary).push(&schema, false).await.unwrap_err();
        assert_eq!(err.to_string(), "schemaPush error: P1012: schema validation failed");
    }

    #[tokio::test]
    async fn test_push_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("schema.prisma");
        std::fs::write(&schema, "model User {}").unwrap();
        let binary = fake_engine(dir.path(), "read line\nsleep 5");

        let err = MigrationEngine::with_binary(binary)
            .with_timeout(Duration::from_millis(200))
            .push(&schema, true)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_schema_file() {
        let err = MigrationEngine::with_binary("/bin/true")
            .push("/does/not/exist.prisma", true)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::ReadSchema { .. }));
    }
}
