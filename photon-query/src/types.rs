//! Client-side value types shared by generated code.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Number of records affected by a bulk or raw write.
///
/// Decodes from `{"count": n}` (bulk writes) and from a bare `n` (`executeRaw`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BatchResult {
    /// Affected records.
    pub count: i64,
}

impl<'de> Deserialize<'de> for BatchResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bare(i64),
            Object { count: i64 },
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Bare(count) | Repr::Object { count } => BatchResult { count },
        })
    }
}

/// 64-bit integer the engine transmits as a quoted string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BigInt(pub i64);

impl Serialize for BigInt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for BigInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(i64),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(BigInt(n)),
            Repr::Text(s) => s
                .parse()
                .map(BigInt)
                .map_err(|e| de::Error::custom(format!("invalid BigInt `{}`: {}", s, e))),
        }
    }
}

impl From<i64> for BigInt {
    fn from(n: i64) -> Self {
        BigInt(n)
    }
}

/// JSON document the engine transmits as a string holding its text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Json(pub serde_json::Value);

impl Serialize for Json {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Json {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(text) => serde_json::from_str(&text)
                .map(Json)
                .map_err(|e| de::Error::custom(format!("invalid JSON text: {}", e))),
            other => Ok(Json(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bigint_from_string_and_number() {
        let a: BigInt = serde_json::from_str(r#""9007199254740993""#).unwrap();
        let b: BigInt = serde_json::from_str("42").unwrap();
        assert_eq!(a, BigInt(9_007_199_254_740_993));
        assert_eq!(b, BigInt(42));
        assert_eq!(serde_json::to_string(&a).unwrap(), r#""9007199254740993""#);
        assert!(serde_json::from_str::<BigInt>(r#""x""#).is_err());
    }

    #[test]
    fn test_json_from_quoted_text() {
        let j: Json = serde_json::from_str(r#""{\"a\":[1,2]}""#).unwrap();
        assert_eq!(j, Json(serde_json::json!({"a": [1, 2]})));
        assert_eq!(serde_json::to_string(&j).unwrap(), r#""{\"a\":[1,2]}""#);
    }

    #[test]
    fn test_batch_result() {
        let r: BatchResult = serde_json::from_str(r#"{"count":3}"#).unwrap();
        assert_eq!(r.count, 3);
        let r: BatchResult = serde_json::from_str("7").unwrap();
        assert_eq!(r, BatchResult { count: 7 });
    }
}
