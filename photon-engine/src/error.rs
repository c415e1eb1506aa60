//! Error types for engine transports.

use std::path::PathBuf;

use photon_query::{ErrorCode, QueryError};
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while starting, reaching or stopping an engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// No engine binary exists at any searched location.
    #[error("no query engine binary found, searched: {}", join_paths(.searched))]
    BinaryNotFound {
        /// Every path that was checked, in priority order.
        searched: Vec<PathBuf>,
    },

    /// An override variable points at a missing file.
    #[error("{var} was provided, but no engine binary was found at {}", .path.display())]
    OverrideMissing {
        /// The variable holding the override.
        var: &'static str,
        /// The configured path.
        path: PathBuf,
    },

    /// The binary reports a different engine version.
    #[error("expected query engine version `{expected}` but got `{actual}`")]
    VersionMismatch {
        /// Version this client was generated against.
        expected: String,
        /// Version reported by `--version`.
        actual: String,
    },

    /// The engine process could not be started.
    #[error("failed to spawn engine: {0}")]
    Spawn(#[source] std::io::Error),

    /// The engine reported an error on stderr while starting.
    #[error("query engine errored: {0}")]
    Startup(String),

    /// The engine process exited abnormally.
    #[error("engine exited abnormally: {0}")]
    Exit(String),

    /// The readiness probe never succeeded.
    #[error("readiness check failed after {attempts} attempts: {last}")]
    HealthCheck {
        /// Attempts made.
        attempts: u32,
        /// Last failure observed.
        last: String,
    },

    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unexpected HTTP status.
    #[error("http status code {status} with response {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The remote proxy does not know the schema, even after re-upload.
    #[error("schema not registered with the remote proxy")]
    SchemaNotRegistered,

    /// The connection string could not be used.
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Request issued before `connect`.
    #[error("client is not connected")]
    NotConnected,

    /// Request issued after `disconnect`.
    #[error("client is already disconnected")]
    AlreadyDisconnected,

    /// Operation exceeded its deadline.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl EngineError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a startup error.
    pub fn startup(message: impl Into<String>) -> Self {
        Self::Startup(message.into())
    }

    /// Check if this is a connection state error.
    pub fn is_connection_state_error(&self) -> bool {
        matches!(self, Self::NotConnected | Self::AlreadyDisconnected)
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

impl From<EngineError> for QueryError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::BinaryNotFound { .. } | EngineError::OverrideMissing { .. } => {
                QueryError::new(ErrorCode::BinaryNotFound, message)
                    .with_suggestion("Set PHOTON_QUERY_ENGINE_BINARY to the engine executable")
            }
            EngineError::VersionMismatch { .. }
            | EngineError::Startup(_)
            | EngineError::HealthCheck { .. } => QueryError::new(ErrorCode::EngineStartup, message),
            EngineError::Spawn(e) => QueryError::new(ErrorCode::EngineStartup, message).with_source(e),
            EngineError::Exit(_) => QueryError::connection(message),
            EngineError::Http(e) if e.is_timeout() => {
                QueryError::new(ErrorCode::Timeout, message).with_source(e)
            }
            EngineError::Http(e) => QueryError::connection(e.to_string()).with_source(e),
            EngineError::Status { status, body } => QueryError::http_status(status, body),
            EngineError::SchemaNotRegistered => QueryError::schema_not_registered(),
            EngineError::InvalidConnectionString(_) => {
                QueryError::new(ErrorCode::InvalidConnectionString, message)
            }
            EngineError::Config(msg) => QueryError::configuration(msg),
            EngineError::NotConnected => QueryError::not_connected(),
            EngineError::AlreadyDisconnected => QueryError::already_disconnected(),
            EngineError::Timeout(ms) => QueryError::timeout(ms),
            EngineError::Io(e) => QueryError::connection(e.to_string()).with_source(e),
            EngineError::Serialization(e) => QueryError::serialization(e.to_string()).with_source(e),
        }
    }
}
