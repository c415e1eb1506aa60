//! Literal values embedded in query text.
//!
//! [`Value`] is a closed set of variants; each knows how to render itself
//! into the query language. Date-times render as RFC3339 with millisecond
//! precision in UTC, unset optionals render as `null`.
//!
//! ```rust
//! use photon_query::Value;
//!
//! assert_eq!(Value::from("a\"b").encode(), r#""a\"b""#);
//! assert_eq!(Value::from(None::<i64>).encode(), "null");
//! assert_eq!(Value::raw("desc").encode(), "desc");
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{QueryError, QueryResult};

/// A literal value in the query language.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `null`.
    Null,
    /// `true` / `false`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Floating point literal. Must be finite.
    Float(f64),
    /// Quoted, escaped string.
    String(String),
    /// Quoted RFC3339 timestamp in UTC with milliseconds.
    DateTime(DateTime<Utc>),
    /// Pass-through token such as an enum member or sort direction.
    Raw(String),
    /// JSON document, sent as a quoted string holding its text.
    Json(serde_json::Value),
    /// Binary data, sent as a quoted base64 string.
    Bytes(Vec<u8>),
    /// Decimal, sent as a quoted string to keep precision.
    Decimal(Decimal),
    /// List of values.
    List(Vec<Value>),
}

impl Value {
    /// Create a pass-through token.
    pub fn raw(token: impl Into<String>) -> Self {
        Value::Raw(token.into())
    }

    /// Check for `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render the value as query text.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        self.encode_into(&mut out);
        out
    }

    /// Reject values with no exact literal form, naming `field`.
    ///
    /// Non-finite floats would otherwise render as `null`. Nested lists are
    /// checked element-wise.
    pub fn check(&self, field: &str) -> QueryResult<()> {
        match self {
            Value::Float(f) if !f.is_finite() => Err(QueryError::unsupported_value(
                field,
                format!("non-finite float {}", f),
            )),
            Value::List(items) => items.iter().try_for_each(|item| item.check(field)),
            _ => Ok(()),
        }
    }

    /// Render the value into an existing buffer.
    ///
    /// Call [`check`](Self::check) first; a non-finite float renders as `null`.
    pub fn encode_into(&self, out: &mut String) {
        match self {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&serde_json::Number::from_f64(*f).map_or_else(
                || "null".to_string(),
                |n| n.to_string(),
            )),
            Value::String(s) => push_quoted(out, s),
            Value::DateTime(dt) => {
                push_quoted(out, &dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Value::Raw(token) => out.push_str(token),
            Value::Json(json) => push_quoted(out, &json.to_string()),
            Value::Bytes(bytes) => push_quoted(out, &STANDARD.encode(bytes)),
            Value::Decimal(d) => push_quoted(out, &d.to_string()),
            Value::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.encode_into(out);
                }
                out.push(']');
            }
        }
    }

    /// Encode any serializable scalar.
    ///
    /// Objects and non-finite floats have no literal form and are rejected
    /// with `UnsupportedValueType` naming `field`.
    pub fn from_serializable<T: Serialize + ?Sized>(field: &str, value: &T) -> QueryResult<Self> {
        let json = serde_json::to_value(value)
            .map_err(|e| QueryError::unsupported_value(field, e.to_string()))?;
        Self::from_json_scalar(field, json)
    }

    fn from_json_scalar(field: &str, json: serde_json::Value) -> QueryResult<Self> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if n.is_u64() {
                    // beyond i64, keep the exact digits
                    Ok(Value::Raw(n.to_string()))
                } else if let Some(f) = n.as_f64() {
                    Value::try_float(field, f)
                } else {
                    Ok(Value::Raw(n.to_string()))
                }
            }
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| Self::from_json_scalar(field, item))
                .collect::<QueryResult<Vec<_>>>()
                .map(Value::List),
            serde_json::Value::Object(_) => Err(QueryError::unsupported_value(
                field,
                "objects have no literal form; use Value::Json",
            )),
        }
    }

    /// Create a float, rejecting NaN and infinities.
    pub fn try_float(field: &str, f: f64) -> QueryResult<Self> {
        if f.is_finite() {
            Ok(Value::Float(f))
        } else {
            Err(QueryError::unsupported_value(field, format!("non-finite float {}", f)))
        }
    }
}

fn push_quoted(out: &mut String, s: &str) {
    // serde_json escaping matches the engine's string literal grammar
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(i: $t) -> Self {
                    Value::Int(i as i64)
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f as f64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(dt: DateTime<Tz>) -> Self {
        Value::DateTime(dt.with_timezone(&Utc))
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::Json(json)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}
