//! Environment variable access.
//!
//! Overrides are read once when a configuration is built, never polled.

use std::collections::HashMap;

/// Explicit path to the query engine executable.
pub const QUERY_ENGINE_BINARY_VAR: &str = "PHOTON_QUERY_ENGINE_BINARY";
/// URL of an already running query engine.
pub const ENGINE_URL_VAR: &str = "PHOTON_ENGINE_URL";
/// Debug toggle.
pub const DEBUG_VAR: &str = "PHOTON_DEBUG";
/// Explicit path to the migration engine executable.
pub const MIGRATION_ENGINE_BINARY_VAR: &str = "PHOTON_MIGRATION_ENGINE_BINARY";
/// Explicit path to the introspection engine executable.
pub const INTROSPECTION_ENGINE_BINARY_VAR: &str = "PHOTON_INTROSPECTION_ENGINE_BINARY";

/// Source for environment variables.
pub trait EnvSource: Send + Sync {
    /// Get an environment variable value.
    fn get(&self, name: &str) -> Option<String>;

    /// Get a variable, treating an empty value as unset.
    fn get_non_empty(&self, name: &str) -> Option<String> {
        self.get(name).filter(|v| !v.is_empty())
    }

    /// Check if a variable exists.
    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Default environment source using std::env.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Environment source backed by a HashMap.
#[derive(Debug, Clone, Default)]
pub struct MapEnvSource {
    vars: HashMap<String, String>,
}

impl MapEnvSource {
    /// Create a new map-based environment source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Add multiple variables.
    pub fn with_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars.extend(vars);
        self
    }
}

impl EnvSource for MapEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Resolve a datasource reference.
///
/// `env("NAME")` is looked up in `source`; anything else is returned as is.
pub fn resolve_reference<S: EnvSource + ?Sized>(value: &str, source: &S) -> Option<String> {
    let trimmed = value.trim();
    match trimmed
        .strip_prefix("env(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(inner) => {
            let name = inner.trim().trim_matches('"');
            source.get_non_empty(name)
        }
        None if trimmed.is_empty() => None,
        None => Some(trimmed.to_string()),
    }
}
