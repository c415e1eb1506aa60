//! JSON-RPC 2.0 envelopes spoken by the migration and introspection engines.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, MigrateResult};

/// Protocol version sent with every request.
pub const VERSION: &str = "2.0";

/// A request line written to the engine's stdin.
#[derive(Debug, Clone, Serialize)]
pub struct Request<P> {
    /// Always [`VERSION`].
    pub jsonrpc: &'static str,
    /// Correlation id echoed back by the engine.
    pub id: u64,
    /// Engine method such as `schemaPush` or `introspect`.
    pub method: String,
    /// Method parameters.
    pub params: P,
}

impl<P: Serialize> Request<P> {
    /// Request with id `1`; each engine process serves a single call.
    pub fn new(method: impl Into<String>, params: P) -> Self {
        Self {
            jsonrpc: VERSION,
            id: 1,
            method: method.into(),
            params,
        }
    }

    /// Encode as one newline-terminated line.
    pub fn to_line(&self) -> MigrateResult<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// A response line read from the engine's stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct Response<R> {
    /// Protocol version reported by the engine.
    #[serde(default)]
    pub jsonrpc: String,
    /// Id of the answered request.
    #[serde(default)]
    pub id: Option<u64>,
    /// Method result on success.
    pub result: Option<R>,
    /// Failure details.
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// Error member of a response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Generic message, usually less useful than `data.message`.
    #[serde(default)]
    pub message: String,
    /// Engine details, if any.
    #[serde(default)]
    pub data: Option<RpcErrorData>,
}

/// Engine-specific error details.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcErrorData {
    /// Whether the engine panicked.
    #[serde(default)]
    pub is_panic: bool,
    /// Human-readable engine message.
    #[serde(default)]
    pub message: String,
    /// Structured context such as the offending field.
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

impl RpcError {
    /// The engine's own message when present, else the JSON-RPC message.
    pub fn user_message(&self) -> &str {
        match &self.data {
            Some(data) if !data.message.is_empty() => &data.message,
            _ => &self.message,
        }
    }

    fn is_panic(&self) -> bool {
        self.data.as_ref().is_some_and(|d| d.is_panic)
    }
}

impl<R: DeserializeOwned> Response<R> {
    /// Parse one response line.
    pub fn parse(line: &str) -> MigrateResult<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(MigrateError::protocol("engine closed stdout without answering"));
        }
        Ok(serde_json::from_str(line)?)
    }

    /// The result, or the engine error for `method`.
    pub fn into_result(self, method: &str) -> MigrateResult<R> {
        if let Some(error) = self.error {
            return Err(MigrateError::Rpc {
                method: method.to_string(),
                code: error.code,
                message: error.user_message().to_string(),
                is_panic: error.is_panic(),
            });
        }
        self.result
            .ok_or_else(|| MigrateError::protocol("response has neither result nor error"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_line() {
        let request = Request::new("schemaPush", json!({"force": true, "schema": "model A {}"}));
        let line = request.to_line().unwrap();
        assert_eq!(line.last(), Some(&b'\n'));

        let parsed: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(
            parsed,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "schemaPush",
                "params": {"force": true, "schema": "model A {}"}
            })
        );
    }

    #[test]
    fn test_result_response() {
        let line = r#"{"jsonrpc":"2.0","result":{"executedSteps":1,"unexecutable":[],"warnings":[]},"id":1}"#;
        let response: Response<serde_json::Value> = Response::parse(line).unwrap();
        assert_eq!(response.id, Some(1));
        let result = response.into_result("schemaPush").unwrap();
        assert_eq!(result["executedSteps"], 1);
    }

    #[test]
    fn test_error_response_prefers_data_message() {
        let line = r#"{"jsonrpc":"2.0","id":1,"error":{"code":4466,"message":"An error happened","data":{"is_panic":false,"message":"P1001: Can't reach database server","meta":{"full_error":"..."}}}}"#;
        let response: Response<serde_json::Value> = Response::parse(line).unwrap();
        let err = response.into_result("introspect").unwrap_err();
        match err {
            MigrateError::Rpc { method, code, message, is_panic } => {
                assert_eq!(method, "introspect");
                assert_eq!(code, 4466);
                assert_eq!(message, "P1001: Can't reach database server");
                assert!(!is_panic);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_without_data() {
        let line = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#;
        let response: Response<serde_json::Value> = Response::parse(line).unwrap();
        let err = response.into_result("nope").unwrap_err();
        assert_eq!(err.to_string(), "nope error: Method not found");
    }

    #[test]
    fn test_empty_and_invalid_lines() {
        assert!(matches!(
            Response::<serde_json::Value>::parse("\n"),
            Err(MigrateError::Protocol(_))
        ));
        assert!(matches!(
            Response::<serde_json::Value>::parse("Error: boot failure"),
            Err(MigrateError::Serialization(_))
        ));
        let neither: Response<serde_json::Value> = Response::parse(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
        assert!(matches!(neither.into_result("x"), Err(MigrateError::Protocol(_))));
    }
}
