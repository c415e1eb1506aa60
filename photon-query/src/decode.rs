//! Response envelope decoding.
//!
//! Errors in the envelope are mapped before any data is looked at:
//! record-not-found becomes the canonical [`QueryError::not_found`], a
//! structured `user_facing_error` is preserved, anything else is returned
//! with its normalized message.

use std::time::Instant;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::protocol::{GqlBatchResponse, GqlError, GqlResponse};
use crate::transform::{DecodeMode, transform_value};

/// Legacy engine messages for a missing record, with newlines collapsed.
pub const NOT_FOUND_SENTINELS: [&str; 2] = [
    r#"Error occurred during query execution: InterpretationError("Error for binding \'0\'", Some(QueryGraphBuilderError(RecordNotFound("Record to update not found."))))"#,
    r#"Error occurred during query execution: InterpretationError("Error for binding \'0\'", Some(QueryGraphBuilderError(RecordNotFound("Record to delete does not exist."))))"#,
];

const NOT_FOUND_SHORT: [&str; 2] = ["Record to update not found.", "Record to delete does not exist."];

/// Check a normalized engine message against the not-found sentinels.
pub fn is_not_found_message(normalized: &str) -> bool {
    NOT_FOUND_SENTINELS.contains(&normalized) || NOT_FOUND_SHORT.contains(&normalized)
}

/// Map one engine error to a [`QueryError`].
pub fn map_engine_error(error: &GqlError) -> QueryError {
    let message = error.normalized_message();
    let structured = error.user_facing_error.as_ref();

    if is_not_found_message(&message) || structured.is_some_and(|e| e.is_record_not_found()) {
        return QueryError::not_found();
    }
    if let Some(ufe) = structured {
        return QueryError::engine(ufe.clone());
    }
    QueryError::query_failed(format!("pql error: {}", message))
}

/// Fail with the first error, if any.
pub fn check_errors(errors: &[GqlError]) -> QueryResult<()> {
    match errors.first() {
        Some(first) => Err(map_engine_error(first)),
        None => Ok(()),
    }
}

/// Parse a single response envelope and return the raw `data.result` text.
pub fn parse_envelope(body: &[u8]) -> QueryResult<String> {
    let response: GqlResponse = serde_json::from_slice(body)
        .map_err(|e| QueryError::malformed_response(e.to_string()).with_source(e))?;
    check_errors(&response.errors)?;
    Ok(response.result_json().to_string())
}

/// Parse a batch envelope and return each statement's raw result, in order.
///
/// Fails on the first batch-level error, then on the first statement error.
pub fn parse_batch_envelope(body: &[u8]) -> QueryResult<Vec<String>> {
    let response: GqlBatchResponse = serde_json::from_slice(body)
        .map_err(|e| QueryError::malformed_response(e.to_string()).with_source(e))?;
    check_errors(&response.errors)?;
    for statement in &response.results {
        check_errors(&statement.errors)?;
    }
    Ok(response
        .results
        .iter()
        .map(|r| r.result_json().to_string())
        .collect())
}

/// Transform and decode raw result text into `T`.
pub fn decode_result<T: DeserializeOwned>(raw: &str, mode: DecodeMode) -> QueryResult<T> {
    let parsed: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| QueryError::malformed_response(e.to_string()).with_source(e))?;
    let transformed = transform_value(parsed, mode);
    serde_json::from_value(transformed).map_err(QueryError::from)
}

/// Decode a full response envelope into `T`.
pub fn decode_response<T: DeserializeOwned>(body: &[u8], mode: DecodeMode) -> QueryResult<T> {
    let start = Instant::now();
    let raw = parse_envelope(body)?;
    let out = decode_result(&raw, mode);
    debug!(elapsed = ?start.elapsed(), "[timing] response decoding");
    out
}
