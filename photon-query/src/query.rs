//! Top-level queries and their execution.
//!
//! ```rust
//! use photon_query::{Field, Operation, Query, Selection};
//!
//! let query = Query::new(Operation::Query, "findUnique", "User")
//!     .arg(Field::object("where", vec![Field::value("id", "u1")]))
//!     .select(Selection::scalars(["id", "email"]));
//!
//! assert_eq!(
//!     query.build().unwrap(),
//!     r#"query findUniqueUser{result: findUniqueUser(where:{id:"u1"}) {id email}}"#
//! );
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::builder::{Field, Selection, render_args, render_selection};
use crate::decode::decode_response;
use crate::error::{QueryError, QueryResult};
use crate::protocol::GqlRequest;
use crate::traits::Engine;
use crate::transform::DecodeMode;

/// Kind of operation in the rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Read.
    Query,
    /// Write, and every raw operation.
    Mutation,
}

impl Operation {
    /// Keyword in the query text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to the engine, before rendering.
///
/// Rendering is pure: building the same query twice yields identical text.
#[derive(Clone)]
pub struct Query {
    engine: Option<Arc<dyn Engine>>,
    /// Operation keyword.
    pub operation: Operation,
    /// Operation name, used for tracing on the engine side.
    pub name: String,
    /// CRUD method such as `findMany` or `queryRaw`.
    pub method: String,
    /// Model name appended to the method.
    pub model: String,
    /// Input arguments.
    pub args: Vec<Field>,
    /// Output selection.
    pub selection: Vec<Selection>,
    /// How tagged scalars are treated when decoding.
    pub decode_mode: DecodeMode,
    /// When the query was created, for timing logs.
    pub created_at: Instant,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("engine", &self.engine.as_ref().map(|e| e.name()))
            .field("operation", &self.operation)
            .field("name", &self.name)
            .field("method", &self.method)
            .field("model", &self.model)
            .field("args", &self.args)
            .field("selection", &self.selection)
            .finish()
    }
}

impl Query {
    /// Create a query without an engine.
    pub fn new(operation: Operation, method: impl Into<String>, model: impl Into<String>) -> Self {
        let method = method.into();
        let model = model.into();
        Self {
            engine: None,
            operation,
            name: format!("{}{}", method, model),
            method,
            model,
            args: Vec::new(),
            selection: Vec::new(),
            decode_mode: DecodeMode::Plain,
            created_at: Instant::now(),
        }
    }

    /// Attach the engine that will execute this query.
    pub fn with_engine(mut self, engine: Arc<dyn Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// The attached engine.
    pub fn engine(&self) -> Option<&Arc<dyn Engine>> {
        self.engine.as_ref()
    }

    /// Override the operation name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add an input argument.
    pub fn arg(mut self, field: Field) -> Self {
        self.args.push(field);
        self
    }

    /// Add several input arguments.
    pub fn args(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.args.extend(fields);
        self
    }

    /// Add output selections.
    pub fn select(mut self, selection: impl IntoIterator<Item = Selection>) -> Self {
        self.selection.extend(selection);
        self
    }

    /// Keep tagged scalars when decoding.
    pub fn tagged(mut self) -> Self {
        self.decode_mode = DecodeMode::Tagged;
        self
    }

    /// Render the full document: `<op> <name>{result: <inner>}`.
    pub fn build(&self) -> QueryResult<String> {
        let mut out = String::with_capacity(128);
        out.push_str(self.operation.as_str());
        out.push(' ');
        out.push_str(&self.name);
        out.push_str("{result: ");
        self.build_inner_into(&mut out)?;
        out.push('}');
        Ok(out)
    }

    /// Render only `<method><Model>(<args>) <selection>`.
    pub fn build_inner(&self) -> QueryResult<String> {
        let mut out = String::with_capacity(96);
        self.build_inner_into(&mut out)?;
        Ok(out)
    }

    fn build_inner_into(&self, out: &mut String) -> QueryResult<()> {
        out.push_str(&self.method);
        out.push_str(&self.model);
        if !self.args.is_empty() {
            out.push('(');
            render_args(out, &self.args).map_err(|e| self.annotate(e))?;
            out.push(')');
        }
        if !self.selection.is_empty() {
            out.push(' ');
            render_selection(out, &self.selection).map_err(|e| self.annotate(e))?;
        }
        Ok(())
    }

    fn annotate(&self, err: QueryError) -> QueryError {
        let err = err.with_context(format!("building {}{}", self.method, self.model));
        if self.model.is_empty() {
            err
        } else {
            err.with_model(&self.model)
        }
    }

    /// Build, send and decode the query.
    pub async fn exec<T: DeserializeOwned>(&self) -> QueryResult<T> {
        let engine = self.engine.as_ref().ok_or_else(QueryError::engine_not_wired)?;
        let text = self.build()?;
        debug!(elapsed = ?self.created_at.elapsed(), "[timing] building");

        let start = Instant::now();
        let body = engine.request(GqlRequest::new(text)).await?;
        debug!(engine = engine.name(), elapsed = ?start.elapsed(), "[timing] request");

        let out = decode_response(&body, self.decode_mode);
        debug!(elapsed = ?self.created_at.elapsed(), "[timing] TOTAL");
        out
    }

    /// Like [`exec`](Self::exec) with a caller deadline on top of the transport timeout.
    pub async fn exec_timeout<T: DeserializeOwned>(&self, deadline: Duration) -> QueryResult<T> {
        with_deadline(deadline, self.exec()).await
    }
}

/// Await `fut`, failing with a timeout error once `deadline` elapses.
pub async fn with_deadline<T>(
    deadline: Duration,
    fut: impl std::future::Future<Output = QueryResult<T>>,
) -> QueryResult<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(QueryError::timeout(deadline.as_millis() as u64)),
    }
}

/// Pre-rendered query text sent verbatim.
#[derive(Clone)]
pub struct QueryString {
    engine: Option<Arc<dyn Engine>>,
    text: String,
}

impl QueryString {
    /// Wrap query text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            engine: None,
            text: text.into(),
        }
    }

    /// Attach the engine that will execute this query.
    pub fn with_engine(mut self, engine: Arc<dyn Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// The query text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Send the text and decode the result.
    pub async fn exec<T: DeserializeOwned>(&self) -> QueryResult<T> {
        let engine = self.engine.as_ref().ok_or_else(QueryError::engine_not_wired)?;
        let body = engine.request(GqlRequest::new(self.text.clone())).await?;
        decode_response(&body, DecodeMode::Plain)
    }
}
