//! Error types for building, sending and decoding engine queries.
//!
//! Every fallible operation in Photon returns a [`QueryError`] carrying:
//! - An [`ErrorCode`] for programmatic handling
//! - A human readable message
//! - Optional context (operation, model, field, query text) and suggestions
//! - The structured engine error, when the engine reported one
//!
//! # Error Codes
//!
//! Error codes follow a pattern: E{category}{number}
//! - 1xxx: Query building errors (duplicate fields, unsupported values)
//! - 2xxx: Engine domain errors (record not found, unique violations)
//! - 3xxx: Connection state and transport errors
//! - 4xxx: Transaction errors
//! - 6xxx: Data and protocol errors
//! - 7xxx: Configuration errors
//! - 9xxx: Internal errors
//!
//! Engine-side codes (`P2002`, `P2025`, ...) are kept verbatim on
//! [`UserFacingError::error_code`] and never mixed with these.
//!
//! ```rust
//! use photon_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::not_found();
//! assert!(err.is_not_found());
//! assert_eq!(err.code.code(), "E2001");
//! ```

use std::fmt;
use thiserror::Error;

use crate::protocol::UserFacingError;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Query building errors (1xxx)
    /// Two sibling fields share a name and both carry a literal (E1001).
    DuplicateField = 1001,
    /// A value cannot be encoded into the query language (E1002).
    UnsupportedValueType = 1002,
    /// A query was executed without an engine attached (E1003).
    EngineNotWired = 1003,

    // Engine domain errors (2xxx)
    /// Record not found (E2001).
    RecordNotFound = 2001,
    /// Unique constraint violation reported by the engine (E2002).
    UniqueConstraint = 2002,
    /// Structured user facing error reported by the engine (E2003).
    EngineError = 2003,
    /// Unstructured error message reported by the engine (E2004).
    QueryFailed = 2004,

    // Connection errors (3xxx)
    /// Query issued before connect (E3001).
    NotConnected = 3001,
    /// Query issued after disconnect (E3002).
    AlreadyDisconnected = 3002,
    /// Engine could not be reached (E3003).
    ConnectionFailed = 3003,
    /// Request deadline elapsed (E3004).
    Timeout = 3004,
    /// Remote proxy does not know the schema hash (E3005).
    SchemaNotRegistered = 3005,
    /// Engine answered with an unexpected HTTP status (E3006).
    HttpStatus = 3006,
    /// Engine process failed to start or become healthy (E3007).
    EngineStartup = 3007,

    // Transaction errors (4xxx)
    /// Transaction batch failed (E4001).
    TransactionFailed = 4001,
    /// Result read before the transaction ran (E4002).
    TransactionNotExecuted = 4002,
    /// Result read after the transaction failed (E4003).
    TransactionResultUnavailable = 4003,
    /// Query already participates in another transaction (E4004).
    AlreadyInTransaction = 4004,

    // Data errors (6xxx)
    /// Tagged raw value carried an unexpected kind (E6001).
    InvalidDataType = 6001,
    /// Serialization error (E6002).
    SerializationError = 6002,
    /// Deserialization error (E6003).
    DeserializationError = 6003,
    /// Response body is not a valid envelope (E6004).
    MalformedResponse = 6004,

    // Configuration errors (7xxx)
    /// Invalid configuration (E7001).
    InvalidConfiguration = 7001,
    /// Missing configuration (E7002).
    MissingConfiguration = 7002,
    /// Invalid connection string (E7003).
    InvalidConnectionString = 7003,
    /// No engine binary could be located (E7004).
    BinaryNotFound = 7004,

    // Internal errors (9xxx)
    /// Internal error (E9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "E2001").
    pub fn code(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::DuplicateField => "Duplicate field conflict",
            Self::UnsupportedValueType => "Unsupported value type",
            Self::EngineNotWired => "Query has no engine",
            Self::RecordNotFound => "Record not found",
            Self::UniqueConstraint => "Unique constraint violation",
            Self::EngineError => "Engine error",
            Self::QueryFailed => "Query failed",
            Self::NotConnected => "Client not connected",
            Self::AlreadyDisconnected => "Client already disconnected",
            Self::ConnectionFailed => "Engine connection failed",
            Self::Timeout => "Request timed out",
            Self::SchemaNotRegistered => "Schema not registered",
            Self::HttpStatus => "Unexpected HTTP status",
            Self::EngineStartup => "Engine failed to start",
            Self::TransactionFailed => "Transaction failed",
            Self::TransactionNotExecuted => "Transaction not executed",
            Self::TransactionResultUnavailable => "Transaction result unavailable",
            Self::AlreadyInTransaction => "Query already in a transaction",
            Self::InvalidDataType => "Invalid data type",
            Self::SerializationError => "Serialization error",
            Self::DeserializationError => "Deserialization error",
            Self::MalformedResponse => "Malformed engine response",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::MissingConfiguration => "Missing configuration",
            Self::InvalidConnectionString => "Invalid connection string",
            Self::BinaryNotFound => "Engine binary not found",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The model involved.
    pub model: Option<String>,
    /// The field involved.
    pub field: Option<String>,
    /// The query text (if available).
    pub query: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<String>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors that can occur while building, sending or decoding queries.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// Structured error reported by the engine, if any.
    pub engine: Option<UserFacingError>,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            engine: None,
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(suggestion.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context.model = Some(model.into());
        self
    }

    /// Set the field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Set the query text.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.context.query = Some(query.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Two sibling fields named `field` both carry a literal value.
    pub fn duplicate_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            ErrorCode::DuplicateField,
            format!("duplicate field `{}`: both occurrences carry a value", field),
        )
        .with_field(&field)
        .with_suggestion(format!("Set `{}` only once per object", field))
        .with_help("Nested filters on the same field are merged; plain values are not")
    }

    /// A value for `field` cannot be represented in the query language.
    pub fn unsupported_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            ErrorCode::UnsupportedValueType,
            format!("unsupported value for `{}`: {}", field, reason.into()),
        )
        .with_field(&field)
    }

    /// The query was executed without an engine.
    pub fn engine_not_wired() -> Self {
        Self::new(ErrorCode::EngineNotWired, "query has no engine attached")
            .with_suggestion("Build queries through a connected client")
    }

    /// The canonical record-not-found error.
    pub fn not_found() -> Self {
        Self::new(ErrorCode::RecordNotFound, "record not found")
            .with_suggestion("Use find_first or find_unique to get None instead of an error")
    }

    /// Wrap a structured engine error.
    pub fn engine(error: UserFacingError) -> Self {
        let code = if error.is_unique_violation() {
            ErrorCode::UniqueConstraint
        } else {
            ErrorCode::EngineError
        };
        let mut err = Self::new(code, error.message.clone());
        if let Some(fields) = error.target_fields() {
            err = err.with_field(fields.join(","));
        }
        err.engine = Some(error);
        err
    }

    /// An unstructured engine error message.
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::QueryFailed, message)
    }

    /// The client was never connected.
    pub fn not_connected() -> Self {
        Self::new(ErrorCode::NotConnected, "client is not connected")
            .with_suggestion("Call connect() before sending queries")
    }

    /// The client was disconnected.
    pub fn already_disconnected() -> Self {
        Self::new(ErrorCode::AlreadyDisconnected, "client is already disconnected")
            .with_suggestion("Create a new client or reconnect before sending queries")
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionFailed, format!("connection error: {}", message.into()))
            .with_suggestion("Check that the query engine is running")
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::new(ErrorCode::Timeout, format!("request timed out after {}ms", duration_ms))
            .with_suggestion("Pass a longer deadline for long running batches")
    }

    /// The remote proxy does not know the current schema.
    pub fn schema_not_registered() -> Self {
        Self::new(ErrorCode::SchemaNotRegistered, "schema not registered with the remote proxy")
    }

    /// The engine answered with an unexpected status code.
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::HttpStatus,
            format!("http status code {} with response {}", status, body.into()),
        )
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransactionFailed, format!("transaction error: {}", message.into()))
    }

    /// Create a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::DeserializationError,
            format!("failed to deserialize result: {}", message.into()),
        )
        .with_suggestion("Check that the target type matches the selected fields")
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message.into())
    }

    /// The response body is not a valid envelope.
    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::MalformedResponse,
            format!("malformed engine response: {}", message.into()),
        )
    }

    /// Create an invalid configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, format!("internal error: {}", message.into()))
    }

    // ============== Error Checks ==============

    /// Check if this is the canonical not found error.
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::RecordNotFound
    }

    /// Check if this is a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        self.code == ErrorCode::UniqueConstraint
    }

    /// Check if this is a connection state error.
    pub fn is_connection_state_error(&self) -> bool {
        matches!(self.code, ErrorCode::NotConnected | ErrorCode::AlreadyDisconnected)
    }

    /// Check if this is a transport error.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConnectionFailed
                | ErrorCode::Timeout
                | ErrorCode::HttpStatus
                | ErrorCode::SchemaNotRegistered
                | ErrorCode::EngineStartup
        )
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::Timeout
    }

    /// The engine-side error code, e.g. `P2002`.
    pub fn engine_code(&self) -> Option<&str> {
        self.engine.as_ref().map(|e| e.error_code.as_str())
    }

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  -> While: {}\n", op));
        }
        if let Some(ref model) = self.context.model {
            output.push_str(&format!("  -> Model: {}\n", model));
        }
        if let Some(ref field) = self.context.field {
            output.push_str(&format!("  -> Field: {}\n", field));
        }
        if let Some(ref engine) = self.engine {
            output.push_str(&format!("  -> Engine code: {}\n", engine.error_code));
        }

        if let Some(ref query) = self.context.query {
            let shown = if query.len() > 200 {
                let mut end = 200;
                while !query.is_char_boundary(end) {
                    end -= 1;
                }
                format!("{}...", &query[..end])
            } else {
                query.clone()
            };
            output.push_str(&format!("  -> Query: {}\n", shown));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::deserialization(err.to_string()).with_source(err)
    }
}

/// Helper for creating errors with context.
#[macro_export]
macro_rules! query_error {
    ($code:expr, $msg:expr) => {
        $crate::error::QueryError::new($code, $msg)
    };
    ($code:expr, $msg:expr, $($key:ident = $value:expr),+ $(,)?) => {{
        let mut err = $crate::error::QueryError::new($code, $msg);
        $(
            err = err.$key($value);
        )+
        err
    }};
}
