//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use photon_query::logging::parse_debug_flag;

use crate::env::{DEBUG_VAR, ENGINE_URL_VAR, EnvSource, QUERY_ENGINE_BINARY_VAR, StdEnvSource};
use crate::error::{EngineError, EngineResult};

/// Engine build this client speaks to.
pub const ENGINE_VERSION: &str = "5a9203d0590c951969e85a7d07215503f4672eb9";

/// Protocol version used in remote proxy URLs.
pub const PROXY_PROTOCOL_VERSION: &str = "3.0.1";

/// Per-request transport ceiling.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Readiness polling policy for a freshly started engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheck {
    /// Maximum number of probes.
    pub attempts: u32,
    /// Pause between probes.
    pub interval: Duration,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            attempts: 100,
            interval: Duration::from_millis(50),
        }
    }
}

/// Configuration for the local engine process.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Schema text passed to the engine.
    pub schema: String,
    /// Datasource name and URL overriding the one in the schema.
    pub datasource_override: Option<(String, String)>,
    /// Explicit engine executable.
    pub binary_override: Option<PathBuf>,
    /// Attach to a running engine at this URL instead of spawning one.
    pub engine_url: Option<String>,
    /// Per-request transport timeout.
    pub request_timeout: Duration,
    /// Readiness polling policy.
    pub health_check: HealthCheck,
    /// Directory searched first for engine binaries.
    pub working_dir: PathBuf,
    /// Cache directory holding downloaded binaries for `engine_version`.
    pub cache_dir: Option<PathBuf>,
    /// Expected engine version.
    pub engine_version: String,
    /// Verbose engine logging.
    pub debug: bool,
}

impl EngineConfig {
    /// Configuration with defaults for the given schema.
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            datasource_override: None,
            binary_override: None,
            engine_url: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            health_check: HealthCheck::default(),
            working_dir: PathBuf::from("."),
            cache_dir: default_cache_dir(ENGINE_VERSION),
            engine_version: ENGINE_VERSION.to_string(),
            debug: false,
        }
    }

    /// Create a builder.
    pub fn builder(schema: impl Into<String>) -> EngineConfigBuilder {
        EngineConfigBuilder::new(schema)
    }

    /// Configuration with overrides read from the process environment.
    pub fn from_env(schema: impl Into<String>) -> Self {
        Self::from_env_source(schema, &StdEnvSource)
    }

    /// Configuration with overrides read from `source`.
    pub fn from_env_source<S: EnvSource + ?Sized>(schema: impl Into<String>, source: &S) -> Self {
        let mut config = Self::new(schema);
        config.binary_override = source.get_non_empty(QUERY_ENGINE_BINARY_VAR).map(PathBuf::from);
        config.engine_url = source.get_non_empty(ENGINE_URL_VAR);
        config.debug = parse_debug_flag(source.get(DEBUG_VAR).as_deref());
        config
    }

    /// Check the configuration before connecting.
    pub fn validate(&self) -> EngineResult<()> {
        if self.schema.trim().is_empty() && self.engine_url.is_none() {
            return Err(EngineError::config("schema is empty"));
        }
        if self.health_check.attempts == 0 {
            return Err(EngineError::config("health check needs at least one attempt"));
        }
        if let Some(url) = &self.engine_url {
            url::Url::parse(url)
                .map_err(|e| EngineError::config(format!("invalid engine URL `{}`: {}", url, e)))?;
        }
        Ok(())
    }
}

/// `<cache>/photon/binaries/<version>` under the user cache directory.
pub fn default_cache_dir(version: &str) -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("photon").join("binaries").join(version))
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a new builder.
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            config: EngineConfig::new(schema),
        }
    }

    /// Override the datasource URL.
    pub fn datasource(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.config.datasource_override = Some((name.into(), url.into()));
        self
    }

    /// Use this engine executable.
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.binary_override = Some(path.into());
        self
    }

    /// Attach to a running engine.
    pub fn engine_url(mut self, url: impl Into<String>) -> Self {
        self.config.engine_url = Some(url.into());
        self
    }

    /// Set the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the readiness polling policy.
    pub fn health_check(mut self, attempts: u32, interval: Duration) -> Self {
        self.config.health_check = HealthCheck { attempts, interval };
        self
    }

    /// Set the working directory searched for binaries.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.working_dir = dir.into();
        self
    }

    /// Set the binary cache directory.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    /// Expect a different engine version.
    pub fn engine_version(mut self, version: impl Into<String>) -> Self {
        self.config.engine_version = version.into();
        self
    }

    /// Enable verbose engine logging.
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> EngineResult<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration for the remote proxy transport.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Schema text uploaded to the proxy.
    pub schema: String,
    /// Connection string, or an `env("NAME")` reference to one.
    pub connection_string: String,
    /// Protocol version segment of the proxy URL.
    pub protocol_version: String,
    /// Per-request transport timeout.
    pub request_timeout: Duration,
    /// Replace `https://<host>` with this base, e.g. for a local test proxy.
    pub base_url: Option<String>,
}

impl ProxyConfig {
    /// Configuration with defaults.
    pub fn new(schema: impl Into<String>, connection_string: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            connection_string: connection_string.into(),
            protocol_version: PROXY_PROTOCOL_VERSION.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            base_url: None,
        }
    }

    /// Use a different protocol version.
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Send requests to `base_url` instead of `https://<host>`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnvSource;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new("model User { id String @id }");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.health_check, HealthCheck { attempts: 100, interval: Duration::from_millis(50) });
        assert_eq!(config.engine_version, ENGINE_VERSION);
        assert!(!config.debug);
        if let Some(dir) = &config.cache_dir {
            assert!(dir.ends_with(format!("photon/binaries/{}", ENGINE_VERSION)));
        }
    }

    #[test]
    fn test_from_env_source() {
        let env = MapEnvSource::new()
            .set(QUERY_ENGINE_BINARY_VAR, "/opt/engine")
            .set(ENGINE_URL_VAR, "")
            .set(DEBUG_VAR, "yes");
        let config = EngineConfig::from_env_source("schema", &env);
        assert_eq!(config.binary_override, Some(PathBuf::from("/opt/engine")));
        assert_eq!(config.engine_url, None);
        assert!(config.debug);
    }

    #[test]
    fn test_builder_validation() {
        let config = EngineConfig::builder("schema")
            .datasource("db", "file:dev.db")
            .health_check(3, Duration::from_millis(10))
            .build()
            .unwrap();
        assert_eq!(config.datasource_override, Some(("db".to_string(), "file:dev.db".to_string())));

        assert!(EngineConfig::builder("").build().is_err());
        assert!(EngineConfig::builder("schema").health_check(0, Duration::ZERO).build().is_err());
        assert!(EngineConfig::builder("schema").engine_url("not a url").build().is_err());
        assert!(EngineConfig::builder("").engine_url("http://127.0.0.1:4466").build().is_ok());
    }

    #[test]
    fn test_proxy_config() {
        let config = ProxyConfig::new("schema", r#"env("DATABASE_URL")"#)
            .with_request_timeout(Duration::from_secs(5));
        assert_eq!(config.protocol_version, "3.0.1");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(config.base_url.is_none());
    }
}
