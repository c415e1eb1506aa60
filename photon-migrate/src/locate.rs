//! Finding the migration and introspection executables.

use std::path::{Path, PathBuf};

use photon_engine::binary::resolve;
use photon_engine::{EnvSource, FsBinaryLocator};
use tracing::debug;

use crate::error::MigrateResult;

/// File name prefix of migration engine builds.
pub const MIGRATION_ENGINE_PREFIX: &str = "prisma-migration-engine-";

/// File name prefix of introspection engine builds.
pub const INTROSPECTION_ENGINE_PREFIX: &str = "prisma-introspection-engine-";

/// Resolve an engine executable.
///
/// `var` overrides everything and must point at an existing file. Otherwise
/// the working directory and `cache_dir` are searched for a platform build.
pub fn locate<S: EnvSource + ?Sized>(
    var: &'static str,
    prefix: &str,
    env: &S,
    working_dir: &Path,
    cache_dir: Option<&Path>,
) -> MigrateResult<PathBuf> {
    let override_path = env.get_non_empty(var).map(PathBuf::from);
    let candidates = FsBinaryLocator::new()
        .with_prefix(prefix)
        .candidates(working_dir, cache_dir);
    let resolved = resolve(var, override_path.as_deref(), &candidates)?;
    debug!(path = %resolved.path.display(), explicit = resolved.explicit, "engine located");
    Ok(resolved.path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;
    use photon_engine::{EngineError, MapEnvSource};

    #[test]
    fn test_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("custom-engine");
        std::fs::write(&binary, b"").unwrap();

        let env = MapEnvSource::new().set("MIGRATE_BIN", binary.display().to_string());
        let found = locate("MIGRATE_BIN", MIGRATION_ENGINE_PREFIX, &env, dir.path(), None).unwrap();
        assert_eq!(found, binary);
    }

    #[test]
    fn test_missing_override_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let env = MapEnvSource::new().set("MIGRATE_BIN", "/does/not/exist");
        let err = locate("MIGRATE_BIN", MIGRATION_ENGINE_PREFIX, &env, dir.path(), None).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::Locate(EngineError::OverrideMissing { var: "MIGRATE_BIN", .. })
        ));
    }

    #[test]
    fn test_cache_dir_search() {
        let work = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let platform = photon_engine::Platform::current();
        let name = platform.with_extension(format!(
            "{}{}",
            INTROSPECTION_ENGINE_PREFIX,
            platform.static_name()
        ));
        std::fs::write(cache.path().join(&name), b"").unwrap();

        let found = locate(
            "UNSET_VAR",
            INTROSPECTION_ENGINE_PREFIX,
            &MapEnvSource::new(),
            work.path(),
            Some(cache.path()),
        )
        .unwrap();
        assert_eq!(found, cache.path().join(name));
    }

    #[test]
    fn test_nothing_found() {
        let work = tempfile::tempdir().unwrap();
        let err = locate(
            "UNSET_VAR",
            MIGRATION_ENGINE_PREFIX,
            &MapEnvSource::new(),
            work.path(),
            None,
        )
        .unwrap_err();
        match err {
            MigrateError::Locate(EngineError::BinaryNotFound { searched }) => {
                assert!(!searched.is_empty());
                assert!(searched.iter().all(|p| p.starts_with(work.path())));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
