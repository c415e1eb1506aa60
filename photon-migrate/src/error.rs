//! Error types for the migration and introspection engines.

use std::path::PathBuf;
use std::time::Duration;

use photon_engine::EngineError;
use photon_query::{ErrorCode, QueryError};
use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Errors that can occur while talking to a migration or introspection engine.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The engine executable could not be located.
    #[error(transparent)]
    Locate(#[from] EngineError),

    /// The schema file could not be read.
    #[error("failed to read schema at {}: {source}", .path.display())]
    ReadSchema {
        /// Path that was read.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// The engine process could not be started.
    #[error("failed to spawn {engine}: {source}")]
    Spawn {
        /// Engine name.
        engine: &'static str,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// No response line arrived before the deadline.
    #[error("{engine} did not answer within {}s", .deadline.as_secs())]
    Timeout {
        /// Engine name.
        engine: &'static str,
        /// Deadline that elapsed.
        deadline: Duration,
    },

    /// The engine answered with a JSON-RPC error.
    #[error("{method} error: {message}")]
    Rpc {
        /// Method that failed.
        method: String,
        /// JSON-RPC error code.
        code: i64,
        /// Message reported by the engine.
        message: String,
        /// Whether the engine panicked.
        is_panic: bool,
    },

    /// The engine answered with something that is not a JSON-RPC response.
    #[error("invalid engine response: {0}")]
    Protocol(String),

    /// Pipe I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Check if the engine reported a panic.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Rpc { is_panic: true, .. })
    }
}

impl From<MigrateError> for QueryError {
    fn from(err: MigrateError) -> Self {
        let message = err.to_string();
        match err {
            MigrateError::Locate(e) => e.into(),
            MigrateError::ReadSchema { source, .. } => {
                QueryError::new(ErrorCode::MissingConfiguration, message).with_source(source)
            }
            MigrateError::Spawn { source, .. } => {
                QueryError::new(ErrorCode::EngineStartup, message).with_source(source)
            }
            MigrateError::Timeout { deadline, .. } => QueryError::timeout(deadline.as_millis() as u64),
            MigrateError::Rpc { .. } => QueryError::new(ErrorCode::EngineError, message),
            MigrateError::Protocol(_) => QueryError::malformed_response(message),
            MigrateError::Io(e) => QueryError::connection(message).with_source(e),
            MigrateError::Serialization(e) => QueryError::serialization(message).with_source(e),
        }
    }
}
