//! Expectation-based engine for unit tests of client code.
//!
//! ```rust
//! use std::sync::Arc;
//! use photon_query::{MockEngine, Operation, Query, Selection};
//!
//! # tokio_test_block(async {
//! let engine = Arc::new(MockEngine::new());
//! let query = Query::new(Operation::Query, "findFirst", "User")
//!     .with_engine(engine.clone())
//!     .select(Selection::scalars(["id"]));
//!
//! engine.expect(&query).returns(serde_json::json!({"id": "u1"}));
//!
//! let user: serde_json::Value = query.exec().await.unwrap();
//! assert_eq!(user["id"], "u1");
//! engine.ensure();
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::json;
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::protocol::{GqlBatchRequest, GqlError, GqlRequest};
use crate::query::Query;
use crate::traits::{BoxFuture, Engine};

#[derive(Debug, Clone)]
enum Outcome {
    Want(serde_json::Value),
    WantErr(GqlError),
}

#[derive(Debug, Clone)]
struct Expectation {
    query: String,
    outcome: Outcome,
    met: bool,
}

/// Engine answering pre-registered queries with pre-registered results.
#[derive(Debug, Default)]
pub struct MockEngine {
    expectations: Mutex<Vec<Expectation>>,
    requests: AtomicUsize,
    batches: AtomicUsize,
}

/// Pending expectation returned by [`MockEngine::expect`].
#[must_use = "call returns() or errors() to register the expectation"]
pub struct Expect<'a> {
    engine: &'a MockEngine,
    query: String,
}

impl Expect<'_> {
    /// Answer the query with `result` as `data.result`.
    pub fn returns(self, result: serde_json::Value) {
        self.engine.push(self.query, Outcome::Want(result));
    }

    /// Answer the query with an engine error.
    pub fn errors(self, error: GqlError) {
        self.engine.push(self.query, Outcome::WantErr(error));
    }
}

impl MockEngine {
    /// Create an engine with no expectations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an expectation for `query`.
    ///
    /// # Panics
    ///
    /// Panics if the query does not build; such an expectation could never match.
    pub fn expect(&self, query: &Query) -> Expect<'_> {
        let text = match query.build() {
            Ok(text) => text,
            Err(err) => panic!("mock expectation does not build: {}", err),
        };
        Expect { engine: self, query: text }
    }

    /// Register an expectation for pre-rendered query text.
    pub fn expect_text(&self, text: impl Into<String>) -> Expect<'_> {
        Expect {
            engine: self,
            query: text.into(),
        }
    }

    fn push(&self, query: String, outcome: Outcome) {
        self.expectations.lock().push(Expectation {
            query,
            outcome,
            met: false,
        });
    }

    /// Assert that every expectation was met.
    ///
    /// # Panics
    ///
    /// Panics when no expectation was registered or one was never requested.
    pub fn ensure(&self) {
        let expectations = self.expectations.lock();
        if expectations.is_empty() {
            panic!("no expectations defined");
        }
        for e in expectations.iter() {
            if !e.met {
                panic!("expectation not met for query `{}` with {:?}", e.query, e.outcome);
            }
        }
    }

    /// Number of single requests received.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Number of batches received.
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    fn answer(&self, query: &str) -> QueryResult<serde_json::Value> {
        let mut expectations = self.expectations.lock();
        let idx = expectations
            .iter()
            .position(|e| !e.met && e.query == query)
            .or_else(|| expectations.iter().position(|e| e.query == query))
            .ok_or_else(|| QueryError::internal(format!("mock engine has no expectation for `{}`", query)))?;

        let expectation = &mut expectations[idx];
        expectation.met = true;
        debug!(query = %query, "mock engine answered");
        Ok(match &expectation.outcome {
            Outcome::Want(result) => json!({ "data": { "result": result } }),
            Outcome::WantErr(error) => json!({ "errors": [error] }),
        })
    }
}

impl Engine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn connect(&self) -> BoxFuture<'_, QueryResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn disconnect(&self) -> BoxFuture<'_, QueryResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn request(&self, request: GqlRequest) -> BoxFuture<'_, QueryResult<Vec<u8>>> {
        Box::pin(async move {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let envelope = self.answer(&request.query)?;
            Ok(serde_json::to_vec(&envelope)?)
        })
    }

    fn batch(&self, request: GqlBatchRequest) -> BoxFuture<'_, QueryResult<Vec<u8>>> {
        Box::pin(async move {
            self.batches.fetch_add(1, Ordering::SeqCst);
            let results = request
                .batch
                .iter()
                .map(|r| self.answer(&r.query))
                .collect::<QueryResult<Vec<_>>>()?;
            Ok(serde_json::to_vec(&json!({ "batchResult": results }))?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Field;
    use crate::query::Operation;
    use crate::ErrorCode;
    use std::sync::Arc;

    fn find(engine: &Arc<MockEngine>, id: &str) -> Query {
        Query::new(Operation::Query, "findUnique", "User")
            .with_engine(engine.clone())
            .arg(Field::object("where", vec![Field::value("id", id)]))
    }

    #[tokio::test]
    async fn test_returns_expected_value() {
        let engine = Arc::new(MockEngine::new());
        let q = find(&engine, "1");
        engine.expect(&q).returns(json!({"id": "1"}));

        let out: serde_json::Value = q.exec().await.unwrap();
        assert_eq!(out, json!({"id": "1"}));
        assert_eq!(engine.request_count(), 1);
        engine.ensure();
    }

    #[tokio::test]
    async fn test_error_goes_through_decoder() {
        let engine = Arc::new(MockEngine::new());
        let q = find(&engine, "1");
        engine.expect(&q).errors(GqlError::new("Record to update not found."));

        let err = q.exec::<serde_json::Value>().await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unexpected_query() {
        let engine = Arc::new(MockEngine::new());
        let err = find(&engine, "2").exec::<serde_json::Value>().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Internal);
    }

    #[test]
    #[should_panic(expected = "expectation not met")]
    fn test_ensure_unmet() {
        let engine = Arc::new(MockEngine::new());
        engine.expect(&find(&engine, "1")).returns(json!(null));
        engine.ensure();
    }
}
