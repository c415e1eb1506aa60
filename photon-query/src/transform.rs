//! Post-processing of `data.result` before it is decoded into a target type.
//!
//! Three shapes need reworking:
//! - columnar SQL results `{"columns":[..],"types":[..],"rows":[[..]]}` are
//!   pivoted into one object per row
//! - cursor results `{"cursor":{"firstBatch":[..]}}` are unwrapped and
//!   extended-JSON wrappers such as `{"$oid": ".."}` flattened
//! - tagged scalars `{"prisma__type":"..","prisma__value":..}` are unwrapped
//!   to their value ([`DecodeMode::Plain`]) or only their null tags replaced
//!   ([`DecodeMode::Tagged`])

use serde_json::{Map, Value as Json};
use tracing::trace;

use crate::error::QueryResult;

/// Key carrying the kind of a tagged scalar.
pub const TYPE_KEY: &str = "prisma__type";
/// Key carrying the value of a tagged scalar.
pub const VALUE_KEY: &str = "prisma__value";

/// How tagged scalars are treated before decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    /// Replace every tagged scalar by its bare value.
    #[default]
    Plain,
    /// Keep tags so typed raw scalars can check their kind; null tags become `null`.
    Tagged,
}

/// Apply every transform to a parsed result.
pub fn transform_value(value: Json, mode: DecodeMode) -> Json {
    let value = if let Some(rows) = pivot_columns(&value, mode) {
        rows
    } else if let Some(docs) = unwrap_cursor(&value) {
        docs
    } else {
        value
    };

    match mode {
        DecodeMode::Plain => unwrap_tagged_values(value),
        DecodeMode::Tagged => normalize_tagged_nulls(value),
    }
}

/// Transform raw result text and re-serialize it.
pub fn transform_result(raw: &str, mode: DecodeMode) -> QueryResult<String> {
    trace!(raw = %raw, "before transform");
    let parsed: Json = serde_json::from_str(raw)?;
    let out = serde_json::to_string(&transform_value(parsed, mode))?;
    trace!(out = %out, "after transform");
    Ok(out)
}

/// Pivot a columnar result into an array of row objects.
///
/// In tagged mode every cell is wrapped with its column type so typed raw
/// scalars can still validate it.
pub fn pivot_columns(value: &Json, mode: DecodeMode) -> Option<Json> {
    let obj = value.as_object()?;
    let columns = obj.get("columns")?.as_array()?;
    let rows = obj.get("rows")?.as_array()?;
    let types = obj.get("types").and_then(Json::as_array);

    let pivoted = rows
        .iter()
        .map(|row| {
            let cells = row.as_array().map(Vec::as_slice).unwrap_or_default();
            let mut record = Map::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                let name = column.as_str().map_or_else(|| column.to_string(), str::to_string);
                let cell = cells.get(i).cloned().unwrap_or(Json::Null);
                let cell = match (mode, types.and_then(|t| t.get(i))) {
                    (DecodeMode::Tagged, Some(kind)) => tag(kind.clone(), cell),
                    _ => cell,
                };
                record.insert(name, cell);
            }
            Json::Object(record)
        })
        .collect();

    Some(Json::Array(pivoted))
}

fn tag(kind: Json, value: Json) -> Json {
    let kind = if value.is_null() { Json::from("null") } else { kind };
    let mut obj = Map::with_capacity(2);
    obj.insert(TYPE_KEY.to_string(), kind);
    obj.insert(VALUE_KEY.to_string(), value);
    Json::Object(obj)
}

/// Unwrap a cursor result and flatten extended-JSON wrappers in its documents.
pub fn unwrap_cursor(value: &Json) -> Option<Json> {
    let batch = value.get("cursor")?.get("firstBatch")?.as_array()?;
    Some(Json::Array(batch.iter().cloned().map(flatten_extended_json).collect()))
}

/// Replace `{"$oid": x}`, `{"$date": x}` and numeric wrappers by `x`.
pub fn flatten_extended_json(value: Json) -> Json {
    match value {
        Json::Object(obj) => {
            if obj.len() == 1 {
                if let Some((key, inner)) = obj.iter().next() {
                    if matches!(
                        key.as_str(),
                        "$oid" | "$date" | "$numberLong" | "$numberInt" | "$numberDouble" | "$numberDecimal"
                    ) {
                        return flatten_extended_json(inner.clone());
                    }
                }
            }
            Json::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, flatten_extended_json(v)))
                    .collect(),
            )
        }
        Json::Array(items) => Json::Array(items.into_iter().map(flatten_extended_json).collect()),
        other => other,
    }
}

fn tagged_parts(obj: &Map<String, Json>) -> Option<(&str, &Json)> {
    let kind = obj.get(TYPE_KEY)?.as_str()?;
    Some((kind, obj.get(VALUE_KEY).unwrap_or(&Json::Null)))
}

/// Replace every tagged scalar by its value, recursively.
///
/// Bytes stay base64 encoded; tagged arrays are unwrapped element by element.
pub fn unwrap_tagged_values(value: Json) -> Json {
    match value {
        Json::Object(obj) => match tagged_parts(&obj) {
            Some(("array", Json::Array(items))) => {
                Json::Array(items.iter().cloned().map(unwrap_tagged_values).collect())
            }
            // tagged values are leaves; their payload is not walked again
            Some((_, inner)) => inner.clone(),
            None => Json::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, unwrap_tagged_values(v)))
                    .collect(),
            ),
        },
        Json::Array(items) => Json::Array(items.into_iter().map(unwrap_tagged_values).collect()),
        other => other,
    }
}

/// Replace only `{"prisma__type":"null",..}` by `null`, recursively.
pub fn normalize_tagged_nulls(value: Json) -> Json {
    match value {
        Json::Object(obj) => match tagged_parts(&obj) {
            Some(("null", _)) => Json::Null,
            Some(_) => Json::Object(obj),
            None => Json::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, normalize_tagged_nulls(v)))
                    .collect(),
            ),
        },
        Json::Array(items) => Json::Array(items.into_iter().map(normalize_tagged_nulls).collect()),
        other => other,
    }
}
