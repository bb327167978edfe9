//! Value Sanitizer
//!
//! Total conversion of extracted values into a JSON-representable tree.
//! Nothing database-native crosses the index boundary: GUIDs become
//! canonical lowercase strings, timestamps become RFC 3339 strings, NaN
//! floats and missing markers become null, binary decodes lossily, and
//! strings carrying embedded JSON objects/arrays are parsed into structured
//! sub-documents. Sanitization is idempotent: re-sanitizing produced JSON
//! is a no-op.

use serde_json::Value as JsonValue;

use crate::source::{SourceRecord, SourceValue};

/// Sanitize one value tree. Total: never errors, pathological inputs
/// collapse to null for the offending value only.
pub fn sanitize_value(value: &SourceValue) -> JsonValue {
    match value {
        SourceValue::Null | SourceValue::Missing => JsonValue::Null,
        SourceValue::Int(i) => JsonValue::from(*i),
        // NaN and infinities have no JSON representation
        SourceValue::Float(f) => match serde_json::Number::from_f64(*f) {
            Some(n) => JsonValue::Number(n),
            None => {
                log::warn!("Non-finite float {} coerced to null", f);
                JsonValue::Null
            }
        },
        SourceValue::Bool(b) => JsonValue::Bool(*b),
        SourceValue::Guid(g) => JsonValue::String(g.to_string()),
        SourceValue::Timestamp(ts) => JsonValue::String(ts.to_rfc3339()),
        SourceValue::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
        SourceValue::Text(s) => match parse_embedded_json(s) {
            Some(parsed) => sanitize_json(&parsed),
            None => JsonValue::String(s.clone()),
        },
        SourceValue::Json(v) => sanitize_json(v),
        SourceValue::Array(items) => JsonValue::Array(items.iter().map(sanitize_value).collect()),
        SourceValue::Record(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), sanitize_value(v)))
                .collect(),
        ),
    }
}

/// Sanitize a whole extracted row into a JSON object
pub fn sanitize_record(record: &SourceRecord) -> serde_json::Map<String, JsonValue> {
    record
        .iter()
        .map(|(k, v)| (k.clone(), sanitize_value(v)))
        .collect()
}

/// Re-entry point for JSON values: resolves stringified JSON columns into
/// structured sub-documents, recursively. Applying this to already
/// sanitized output changes nothing.
pub fn sanitize_json(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sanitize_json(v)))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(sanitize_json).collect()),
        JsonValue::String(s) => match parse_embedded_json(s) {
            Some(parsed) => sanitize_json(&parsed),
            None => value.clone(),
        },
        _ => value.clone(),
    }
}

/// Try to parse a string as an embedded JSON object or array. Scalar JSON
/// ("123", "true") stays a string; only containers are promoted.
pub fn parse_embedded_json(s: &str) -> Option<JsonValue> {
    let trimmed = s.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    match serde_json::from_str::<JsonValue>(s) {
        Ok(v @ (JsonValue::Object(_) | JsonValue::Array(_))) => Some(v),
        _ => None,
    }
}
