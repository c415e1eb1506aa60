//! Typed scalars for raw query results.
//!
//! Raw results carry their own type information as
//! `{"prisma__type": "<kind>", "prisma__value": <value>}`. Each type here
//! accepts only its own kinds and fails with a type error otherwise. Use them
//! with [`QueryRawExec::exec_typed`](crate::raw::QueryRawExec::exec_typed),
//! which keeps the tags intact; nullable columns decode as `Option<_>`.
//!
//! ```rust
//! use photon_query::tagged::{RawInt, RawString};
//!
//! let s: RawString = serde_json::from_str(r#"{"prisma__type":"string","prisma__value":"a"}"#).unwrap();
//! assert_eq!(s.0, "a");
//! assert!(serde_json::from_str::<RawInt>(r#"{"prisma__type":"string","prisma__value":"a"}"#).is_err());
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::transform::{TYPE_KEY, VALUE_KEY};

#[derive(Deserialize)]
struct Tagged {
    #[serde(rename = "prisma__type")]
    kind: String,
    #[serde(rename = "prisma__value", default)]
    value: serde_json::Value,
}

impl Tagged {
    fn expect<E: de::Error>(self, kinds: &[&str]) -> Result<serde_json::Value, E> {
        if kinds.contains(&self.kind.as_str()) {
            Ok(self.value)
        } else {
            Err(E::custom(format!(
                "invalid type {}, expected {}",
                self.kind,
                kinds.join(" or ")
            )))
        }
    }
}

fn plain<T: serde::de::DeserializeOwned, E: de::Error>(value: serde_json::Value) -> Result<T, E> {
    serde_json::from_value(value).map_err(E::custom)
}

fn parse_decimal<E: de::Error>(value: serde_json::Value) -> Result<Decimal, E> {
    let text = match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        other => return Err(E::custom(format!("invalid decimal {}", other))),
    };
    text.parse().map_err(|e| E::custom(format!("invalid decimal {}: {}", text, e)))
}

fn parse_bigint<E: de::Error>(value: serde_json::Value) -> Result<i64, E> {
    match value {
        serde_json::Value::String(s) => s
            .parse()
            .map_err(|e| E::custom(format!("invalid bigint {}: {}", s, e))),
        other => plain(other),
    }
}

fn parse_bytes<E: de::Error>(value: serde_json::Value) -> Result<Vec<u8>, E> {
    let text: String = plain(value)?;
    STANDARD.decode(text.as_bytes()).map_err(E::custom)
}

fn parse_datetime<E: de::Error>(value: serde_json::Value) -> Result<DateTime<Utc>, E> {
    let text: String = plain(value)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| E::custom(format!("invalid date {}", text)))
}

macro_rules! tagged_scalar {
    ($(#[$doc:meta])* $name:ident($inner:ty), [$($kind:literal),+], $parse:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Tag kinds accepted by this type.
            pub const KINDS: &'static [&'static str] = &[$($kind),+];

            /// Unwrap the value.
            pub fn into_inner(self) -> $inner {
                self.0
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = Tagged::deserialize(deserializer)?.expect::<D::Error>(Self::KINDS)?;
                $parse(value).map($name)
            }
        }
    };
}

tagged_scalar!(
    /// `string` column.
    RawString(String), ["string"], plain::<String, _>
);
tagged_scalar!(
    /// `int` column.
    RawInt(i64), ["int"], plain::<i64, _>
);
tagged_scalar!(
    /// `double` / `float` column.
    RawFloat(f64), ["double", "float"], plain::<f64, _>
);
tagged_scalar!(
    /// `bool` column.
    RawBool(bool), ["bool", "boolean"], plain::<bool, _>
);
tagged_scalar!(
    /// `bigint` column, transmitted as a string or number.
    RawBigInt(i64), ["bigint"], parse_bigint
);
tagged_scalar!(
    /// `decimal` column.
    RawDecimal(Decimal), ["decimal"], parse_decimal
);
tagged_scalar!(
    /// `bytes` column, base64 on the wire.
    RawBytes(Vec<u8>), ["bytes"], parse_bytes
);
tagged_scalar!(
    /// `json` column.
    RawJson(serde_json::Value), ["json"], plain::<serde_json::Value, _>
);
tagged_scalar!(
    /// `date` / `datetime` column.
    RawDateTime(DateTime<Utc>), ["date", "datetime"], parse_datetime
);

/// Build the tagged form of a value, as used for raw query parameters.
pub fn tag(kind: &str, value: serde_json::Value) -> serde_json::Value {
    let mut obj = serde_json::Map::with_capacity(2);
    obj.insert(TYPE_KEY.to_string(), serde_json::Value::from(kind));
    obj.insert(VALUE_KEY.to_string(), value);
    serde_json::Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn from<T: serde::de::DeserializeOwned>(kind: &str, value: serde_json::Value) -> Result<T, serde_json::Error> {
        serde_json::from_value(tag(kind, value))
    }

    #[test]
    fn test_matching_kinds() {
        assert_eq!(from::<RawString>("string", json!("a")).unwrap().0, "a");
        assert_eq!(from::<RawInt>("int", json!(5)).unwrap().0, 5);
        assert_eq!(from::<RawFloat>("double", json!(5.5)).unwrap().0, 5.5);
        assert!(from::<RawBool>("bool", json!(true)).unwrap().0);
        assert_eq!(from::<RawBigInt>("bigint", json!("9007199254740993")).unwrap().0, 9_007_199_254_740_993);
        assert_eq!(from::<RawDecimal>("decimal", json!("5.5")).unwrap().0, "5.5".parse::<Decimal>().unwrap());
        assert_eq!(from::<RawBytes>("bytes", json!("MTIz")).unwrap().0, b"123".to_vec());
        assert_eq!(from::<RawJson>("json", json!({"field": "value"})).unwrap().0, json!({"field": "value"}));
    }

    #[test]
    fn test_datetime_kinds() {
        let expected = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(from::<RawDateTime>("datetime", json!("2020-01-01T00:00:00+00:00")).unwrap().0, expected);
        assert_eq!(from::<RawDateTime>("date", json!("2020-01-01")).unwrap().0, expected);
    }

    #[test]
    fn test_mismatched_kind_is_rejected() {
        let err = from::<RawInt>("string", json!("5")).unwrap_err();
        assert!(err.to_string().contains("expected int"));
        assert!(from::<RawString>("int", json!(5)).is_err());
        assert!(from::<RawBytes>("string", json!("MTIz")).is_err());
        assert!(from::<RawDateTime>("string", json!("2020-01-01")).is_err());
    }

    #[test]
    fn test_null_decodes_into_option() {
        let v: Vec<Option<RawString>> = serde_json::from_value(json!([
            {"prisma__type": "string", "prisma__value": "a"},
            null
        ]))
        .unwrap();
        assert_eq!(v, vec![Some(RawString("a".into())), None]);
    }
}
