//! Wire types exchanged with the query engine.
//!
//! Requests are plain JSON documents carrying the rendered query text.
//! Responses use the envelope shape
//! `{"data":{"result":...},"errors":[...],"extensions":{}}`; batches wrap one
//! envelope per statement under `batchResult`.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// A single query request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GqlRequest {
    /// Rendered query text.
    pub query: String,
    /// Always empty; values are inlined into the query text.
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
}

impl GqlRequest {
    /// Wrap rendered query text.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: serde_json::Map::new(),
        }
    }
}

/// Several queries sent as one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GqlBatchRequest {
    /// Statements in submission order.
    pub batch: Vec<GqlRequest>,
    /// Whether the engine must run the batch atomically.
    pub transaction: bool,
}

/// Response envelope for a single query.
#[derive(Debug, Deserialize)]
pub struct GqlResponse {
    /// Result payload; absent when the query failed.
    #[serde(default)]
    pub data: Option<GqlData>,
    /// Errors reported by the engine.
    #[serde(default)]
    pub errors: Vec<GqlError>,
    /// Engine extensions, unused by the client.
    #[serde(default)]
    pub extensions: serde_json::Map<String, serde_json::Value>,
}

/// The `data` member of an envelope.
#[derive(Debug, Deserialize)]
pub struct GqlData {
    /// Raw JSON of the `result` member, kept unparsed until the target type is known.
    #[serde(default)]
    pub result: Option<Box<RawValue>>,
}

impl GqlResponse {
    /// Raw JSON text of `data.result`, `null` when missing.
    pub fn result_json(&self) -> &str {
        self.data
            .as_ref()
            .and_then(|d| d.result.as_deref())
            .map(RawValue::get)
            .unwrap_or("null")
    }
}

/// Response envelope for a batch.
#[derive(Debug, Deserialize)]
pub struct GqlBatchResponse {
    /// Errors affecting the whole batch.
    #[serde(default)]
    pub errors: Vec<GqlError>,
    /// One envelope per statement, in submission order.
    #[serde(rename = "batchResult", default)]
    pub results: Vec<GqlResponse>,
}

/// One error reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GqlError {
    /// Raw error message.
    #[serde(rename = "error")]
    pub message: String,
    /// Path of the failing selection.
    #[serde(default)]
    pub path: Vec<serde_json::Value>,
    /// Structured error, emitted by newer engines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_facing_error: Option<UserFacingError>,
}

impl GqlError {
    /// Create an unstructured error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
            user_facing_error: None,
        }
    }

    /// The message with embedded newlines collapsed to spaces.
    pub fn normalized_message(&self) -> String {
        self.message.replace('\n', " ")
    }
}

/// Structured engine error with a stable error code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFacingError {
    /// Whether the engine panicked.
    #[serde(default)]
    pub is_panic: bool,
    /// Human readable message.
    pub message: String,
    /// Error metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ErrorMeta>,
    /// Engine error code such as `P2002`.
    #[serde(default)]
    pub error_code: String,
}

/// Metadata attached to a [`UserFacingError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMeta {
    /// Constraint target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ErrorTarget>,
}

/// Constraint target: a list of fields on SQL backends, an index name on others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorTarget {
    /// Field names.
    Fields(Vec<String>),
    /// Constraint or index name.
    Key(String),
}

/// Engine code for unique constraint violations.
pub const UNIQUE_VIOLATION: &str = "P2002";
/// Engine code for a missing record required by an operation.
pub const RECORD_NOT_FOUND: &str = "P2025";

impl UserFacingError {
    /// Check for a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        self.error_code == UNIQUE_VIOLATION
    }

    /// Check for a missing record.
    pub fn is_record_not_found(&self) -> bool {
        self.error_code == RECORD_NOT_FOUND
    }

    /// Violated fields, normalized to a list.
    pub fn target_fields(&self) -> Option<Vec<String>> {
        match self.meta.as_ref()?.target.as_ref()? {
            ErrorTarget::Fields(fields) => Some(fields.clone()),
            ErrorTarget::Key(key) => Some(vec![key.clone()]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_serialization() {
        let req = GqlRequest::new("query q{result: findManyUser {id}}");
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"query":"query q{result: findManyUser {id}}","variables":{}}"#);
    }

    #[test]
    fn test_batch_request_serialization() {
        let req = GqlBatchRequest {
            batch: vec![GqlRequest::new("a"), GqlRequest::new("b")],
            transaction: true,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"batch":[{"query":"a","variables":{}},{"query":"b","variables":{}}],"transaction":true}"#
        );
    }

    #[test]
    fn test_parse_envelope_with_user_facing_error() {
        let body = r#"{"errors":[{"error":"boom","path":["createOneUser"],"user_facing_error":{"is_panic":false,"message":"Unique constraint failed","meta":{"target":["email"]},"error_code":"P2002"}}]}"#;
        let resp: GqlResponse = serde_json::from_str(body).unwrap();
        let ufe = resp.errors[0].user_facing_error.as_ref().unwrap();
        assert!(ufe.is_unique_violation());
        assert_eq!(ufe.target_fields(), Some(vec!["email".to_string()]));
    }

    #[test]
    fn test_target_as_single_key() {
        let body = r#"{"is_panic":false,"message":"m","meta":{"target":"User_email_key"},"error_code":"P2002"}"#;
        let ufe: UserFacingError = serde_json::from_str(body).unwrap();
        assert_eq!(ufe.meta.unwrap().target, Some(ErrorTarget::Key("User_email_key".into())));
    }

    #[test]
    fn test_result_json_defaults_to_null() {
        let resp: GqlResponse = serde_json::from_str(r#"{"data":{"result":null}}"#).unwrap();
        assert_eq!(resp.result_json(), "null");
        let resp: GqlResponse = serde_json::from_str(r#"{"data":{"result":{"id":"1"}}}"#).unwrap();
        assert_eq!(resp.result_json(), r#"{"id":"1"}"#);
    }
}
