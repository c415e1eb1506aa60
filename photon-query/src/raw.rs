//! Raw SQL and database command execution.
//!
//! Raw operations are ordinary queries with a fixed shape:
//! `mutation <name>{result: queryRaw(query:"<sql>",parameters:"[...]")}`.
//! Parameters are sent as a JSON array inside a string; values the engine
//! cannot infer from plain JSON are sent in tagged form
//! (`{"prisma__type":"date","prisma__value":...}`).
//!
//! # Building SQL incrementally
//!
//! ```rust
//! use photon_query::raw::{Placeholder, Sql};
//!
//! let sql = Sql::new("SELECT * FROM users WHERE active = ")
//!     .bind(true)
//!     .push_if(true, " AND age > ")
//!     .bind(18);
//! assert_eq!(sql.sql(), "SELECT * FROM users WHERE active = $1 AND age > $2");
//! assert_eq!(sql.params().len(), 2);
//!
//! let sql = Sql::new("SELECT 1 WHERE x = ").with_placeholder(Placeholder::Question).bind(1);
//! assert_eq!(sql.sql(), "SELECT 1 WHERE x = ?");
//! ```
//!
//! Values bound through [`Sql`] are always parameters and never interpolated
//! into the SQL text.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::builder::Field;
use crate::error::QueryResult;
use crate::query::{Operation, Query, QueryString};
use crate::tagged::tag;
use crate::traits::Engine;
use crate::transaction::TxResult;
use crate::types::BatchResult;
use crate::value::Value;

/// Placeholder style for bound parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placeholder {
    /// `$1`, `$2`, ... (PostgreSQL, CockroachDB).
    #[default]
    Dollar,
    /// `?` (MySQL, SQLite).
    Question,
    /// `@P1`, `@P2`, ... (SQL Server).
    AtP,
}

impl Placeholder {
    /// Render the placeholder for the 1-based `index`.
    pub fn render(&self, index: usize) -> String {
        match self {
            Self::Dollar => format!("${}", index),
            Self::Question => "?".to_string(),
            Self::AtP => format!("@P{}", index),
        }
    }
}

/// A raw SQL statement with bound parameters.
#[derive(Debug, Clone, Default)]
pub struct Sql {
    text: String,
    params: Vec<Value>,
    placeholder: Placeholder,
}

impl Sql {
    /// Create a statement from literal SQL.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            text: sql.into(),
            params: Vec::new(),
            placeholder: Placeholder::default(),
        }
    }

    /// Set the placeholder style for subsequent binds.
    pub fn with_placeholder(mut self, placeholder: Placeholder) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Append literal SQL.
    pub fn push(mut self, sql: impl AsRef<str>) -> Self {
        self.text.push_str(sql.as_ref());
        self
    }

    /// Append a placeholder and bind its value.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        let placeholder = self.placeholder.render(self.params.len());
        self.text.push_str(&placeholder);
        self
    }

    /// Append literal SQL when `condition` holds.
    pub fn push_if(self, condition: bool, sql: impl AsRef<str>) -> Self {
        if condition { self.push(sql) } else { self }
    }

    /// Append SQL and bind a value.
    pub fn push_bind(self, sql: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.push(sql).bind(value)
    }

    /// Bind a comma separated list of values, e.g. for `IN (...)`.
    pub fn bind_list<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                self = self.push(", ");
            }
            self = self.bind(value);
        }
        self
    }

    /// The SQL text.
    pub fn sql(&self) -> &str {
        &self.text
    }

    /// The bound parameters, in order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Split into text and parameters.
    pub fn build(self) -> (String, Vec<Value>) {
        debug!(sql_len = self.text.len(), param_count = self.params.len(), "Sql::build()");
        (self.text, self.params)
    }
}

/// Encode one raw parameter as JSON, tagging kinds plain JSON cannot express.
pub fn encode_param(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::String(s) | Value::Raw(s) => Json::String(s.clone()),
        Value::DateTime(dt) => tag("date", Json::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))),
        Value::Decimal(d) => tag("decimal", Json::String(d.to_string())),
        Value::Json(json) => tag("json", Json::String(URL_SAFE.encode(json.to_string()))),
        Value::Bytes(bytes) => tag("bytes", Json::String(URL_SAFE.encode(bytes))),
        Value::List(items) => Json::Array(items.iter().map(encode_param).collect()),
    }
}

/// Encode parameters as the JSON array text the engine expects.
pub fn encode_params(params: &[Value]) -> String {
    let array = serde_json::Value::Array(params.iter().map(encode_param).collect());
    array.to_string()
}

fn raw_query(engine: Option<Arc<dyn Engine>>, method: &str, sql: String, params: &[Value]) -> Query {
    // unencodable parameters are kept as-is so that build() reports them
    let parameters = match params.iter().try_for_each(|p| p.check("parameters")) {
        Ok(()) => Value::from(encode_params(params)),
        Err(_) => Value::List(params.to_vec()),
    };
    debug!(parameters = ?parameters, "raw params");

    let query = Query::new(Operation::Mutation, method, "")
        .arg(Field::value("query", sql))
        .arg(Field::value("parameters", parameters));
    match engine {
        Some(engine) => query.with_engine(engine),
        None => query,
    }
}

/// Entry point for raw operations on one engine.
#[derive(Clone)]
pub struct Raw {
    engine: Option<Arc<dyn Engine>>,
}

impl std::fmt::Debug for Raw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raw")
            .field("engine", &self.engine.as_ref().map(|e| e.name()))
            .finish()
    }
}

impl Raw {
    /// Raw operations executed by `engine`.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine: Some(engine) }
    }

    /// Raw operations without an engine, for rendering only.
    pub fn detached() -> Self {
        Self { engine: None }
    }

    /// A row-returning SQL statement.
    pub fn query_raw(&self, sql: impl Into<String>, params: Vec<Value>) -> QueryRawExec {
        QueryRawExec {
            query: raw_query(self.engine.clone(), "queryRaw", sql.into(), &params),
        }
    }

    /// A row-returning statement built with [`Sql`].
    pub fn query_sql(&self, sql: Sql) -> QueryRawExec {
        let (text, params) = sql.build();
        self.query_raw(text, params)
    }

    /// A statement returning the number of affected rows.
    pub fn execute_raw(&self, sql: impl Into<String>, params: Vec<Value>) -> ExecuteRawExec {
        ExecuteRawExec {
            query: raw_query(self.engine.clone(), "executeRaw", sql.into(), &params),
        }
    }

    /// An affected-rows statement built with [`Sql`].
    pub fn execute_sql(&self, sql: Sql) -> ExecuteRawExec {
        let (text, params) = sql.build();
        self.execute_raw(text, params)
    }

    /// A database-native command document, e.g. for document stores.
    pub fn run_command_raw(&self, command: serde_json::Value) -> QueryRawExec {
        let query = Query::new(Operation::Mutation, "runCommandRaw", "")
            .arg(Field::value("command", Value::Json(command)));
        QueryRawExec {
            query: match self.engine.clone() {
                Some(engine) => query.with_engine(engine),
                None => query,
            },
        }
    }

    /// Pre-rendered query text sent verbatim.
    pub fn query_string(&self, text: impl Into<String>) -> QueryString {
        let query = QueryString::new(text);
        match self.engine.clone() {
            Some(engine) => query.with_engine(engine),
            None => query,
        }
    }
}

/// A pending `queryRaw` or `runCommandRaw`.
#[derive(Debug, Clone)]
pub struct QueryRawExec {
    query: Query,
}

impl QueryRawExec {
    /// The underlying query.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Run and decode rows into `T`, with tagged scalars unwrapped.
    pub async fn exec<T: DeserializeOwned>(&self) -> QueryResult<T> {
        self.query.exec().await
    }

    /// Run and decode rows into `T` keeping scalar tags, for [`crate::tagged`] types.
    pub async fn exec_typed<T: DeserializeOwned>(&self) -> QueryResult<T> {
        self.query.clone().tagged().exec().await
    }

    /// Join a transaction, decoding with tagged scalars unwrapped.
    pub fn tx<T>(self) -> TxResult<T> {
        TxResult::new(self.query)
    }

    /// Join a transaction, keeping scalar tags.
    pub fn tx_typed<T>(self) -> TxResult<T> {
        TxResult::new(self.query.tagged())
    }
}

/// A pending `executeRaw`.
#[derive(Debug, Clone)]
pub struct ExecuteRawExec {
    query: Query,
}

impl ExecuteRawExec {
    /// The underlying query.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Run and return the affected row count.
    pub async fn exec(&self) -> QueryResult<BatchResult> {
        self.query.exec().await
    }

    /// Join a transaction.
    pub fn tx(self) -> TxResult<BatchResult> {
        TxResult::new(self.query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEngine;
    use crate::tagged::{RawInt, RawString};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_query_raw_text() {
        let q = Raw::detached().query_raw("SELECT * FROM \"User\" WHERE id = $1", vec!["a".into()]);
        assert_eq!(
            q.query().build().unwrap(),
            r#"mutation queryRaw{result: queryRaw(query:"SELECT * FROM \"User\" WHERE id = $1",parameters:"[\"a\"]")}"#
        );
    }

    #[test]
    fn test_execute_raw_without_params() {
        let q = Raw::detached().execute_raw("DELETE FROM t", vec![]);
        assert_eq!(
            q.query().build().unwrap(),
            r#"mutation executeRaw{result: executeRaw(query:"DELETE FROM t",parameters:"[]")}"#
        );
    }

    #[test]
    fn test_param_encoding() {
        let dt = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();
        let params = vec![
            Value::from(1),
            Value::from("x"),
            Value::Null,
            Value::from(dt),
            Value::Decimal("1.50".parse().unwrap()),
            Value::Bytes(b"123".to_vec()),
            Value::Json(json!({"a": 1})),
        ];
        assert_eq!(
            encode_params(&params),
            concat!(
                r#"[1,"x",null,"#,
                r#"{"prisma__type":"date","prisma__value":"2021-06-01T12:00:00.000Z"},"#,
                r#"{"prisma__type":"decimal","prisma__value":"1.50"},"#,
                r#"{"prisma__type":"bytes","prisma__value":"MTIz"},"#,
                r#"{"prisma__type":"json","prisma__value":"eyJhIjoxfQ=="}]"#
            )
        );
    }

    #[test]
    fn test_non_finite_param_fails_build() {
        let q = Raw::detached().query_raw("SELECT $1", vec![Value::from(f64::INFINITY)]);
        let err = q.query().build().unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::UnsupportedValueType);
        assert_eq!(err.context.field.as_deref(), Some("parameters"));
    }

    #[test]
    fn test_run_command_raw_text() {
        let q = Raw::detached().run_command_raw(json!({"find": "User"}));
        assert_eq!(
            q.query().build().unwrap(),
            r#"mutation runCommandRaw{result: runCommandRaw(command:"{\"find\":\"User\"}")}"#
        );
    }

    #[test]
    fn test_sql_builder() {
        let sql = Sql::new("SELECT * FROM t WHERE id IN (")
            .bind_list(["a", "b"])
            .push(") AND n > ")
            .bind(3);
        assert_eq!(sql.sql(), "SELECT * FROM t WHERE id IN ($1, $2) AND n > $3");
        let sql = Sql::new("SELECT ").with_placeholder(Placeholder::AtP).push_bind("", 1).push_bind(", ", 2);
        assert_eq!(sql.sql(), "SELECT @P1, @P2");
    }

    #[tokio::test]
    async fn test_exec_plain_and_typed() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Row {
            id: String,
            n: i64,
        }
        #[derive(Debug, Deserialize, PartialEq)]
        struct TypedRow {
            id: RawString,
            n: Option<RawInt>,
        }

        let engine = Arc::new(MockEngine::new());
        let raw = Raw::new(engine.clone());
        let q = raw.query_raw("SELECT id, n FROM t", vec![]);
        engine.expect(q.query()).returns(json!([
            {"id": {"prisma__type": "string", "prisma__value": "a"}, "n": {"prisma__type": "int", "prisma__value": 1}}
        ]));
        engine.expect(q.query()).returns(json!([
            {"id": {"prisma__type": "string", "prisma__value": "b"}, "n": {"prisma__type": "null", "prisma__value": null}}
        ]));

        let rows: Vec<Row> = q.exec().await.unwrap();
        assert_eq!(rows, vec![Row { id: "a".into(), n: 1 }]);

        let rows: Vec<TypedRow> = q.exec_typed().await.unwrap();
        assert_eq!(rows, vec![TypedRow { id: RawString("b".into()), n: None }]);
        engine.ensure();
    }

    #[tokio::test]
    async fn test_execute_raw_count() {
        let engine = Arc::new(MockEngine::new());
        let q = Raw::new(engine.clone()).execute_raw("UPDATE t SET n = 1", vec![]);
        engine.expect(q.query()).returns(json!(4));
        assert_eq!(q.exec().await.unwrap(), BatchResult { count: 4 });
    }
}
