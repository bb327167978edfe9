//! Database-native value representation for extracted rows

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A value as it comes out of the relational source, before sanitization
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    /// SQL NULL
    Null,
    /// Missing-value marker (NaT, undecodable column, masked field)
    Missing,
    /// Whole number (smallint, integer, bigint)
    Int(i64),
    /// Floating point (real, double precision, numeric)
    Float(f64),
    /// Boolean
    Bool(bool),
    /// Unique identifier
    Guid(Uuid),
    /// Timestamp (with or without zone, normalized to UTC)
    Timestamp(DateTime<Utc>),
    /// Raw binary column
    Bytes(Vec<u8>),
    /// Character data; may carry embedded JSON text
    Text(String),
    /// Structured json/jsonb column
    Json(serde_json::Value),
    /// Sequence of values
    Array(Vec<SourceValue>),
    /// Nested record (sub-document built during relationship resolution)
    Record(BTreeMap<String, SourceValue>),
}

impl SourceValue {
    /// Check if this value is null or a missing marker
    pub fn is_null(&self) -> bool {
        matches!(self, SourceValue::Null | SourceValue::Missing)
    }

    /// Try to get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SourceValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SourceValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as timestamp
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SourceValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Identity rendering: GUIDs in canonical lowercase hyphenated form,
    /// plain strings as-is. Used when a key column may surface as either.
    pub fn as_id_string(&self) -> Option<String> {
        match self {
            SourceValue::Guid(g) => Some(g.to_string()),
            SourceValue::Text(s) => Some(s.clone()),
            SourceValue::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceValue::Null => write!(f, "(null)"),
            SourceValue::Missing => write!(f, "(missing)"),
            SourceValue::Int(i) => write!(f, "{}", i),
            SourceValue::Float(fl) => write!(f, "{}", fl),
            SourceValue::Bool(b) => write!(f, "{}", b),
            SourceValue::Guid(g) => write!(f, "{}", g),
            SourceValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            SourceValue::Bytes(b) => write!(f, "({} bytes)", b.len()),
            SourceValue::Text(s) => write!(f, "{}", s),
            SourceValue::Json(v) => write!(f, "{}", v),
            SourceValue::Array(items) => write!(f, "[{} items]", items.len()),
            SourceValue::Record(fields) => write!(f, "{{{} fields}}", fields.len()),
        }
    }
}

impl Default for SourceValue {
    fn default() -> Self {
        SourceValue::Null
    }
}

/// One extracted row: ordered field name → value map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRecord {
    fields: BTreeMap<String, SourceValue>,
}

impl SourceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: SourceValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&SourceValue> {
        self.fields.get(name)
    }

    /// Field lookup that treats SQL NULL and missing markers as absent
    pub fn get_present(&self, name: &str) -> Option<&SourceValue> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Identity string for a key column (GUID, text, or integer key)
    pub fn id_string(&self, name: &str) -> Option<String> {
        self.get_present(name).and_then(|v| v.as_id_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SourceValue)> {
        self.fields.iter()
    }
}

impl FromIterator<(String, SourceValue)> for SourceRecord {
    fn from_iter<T: IntoIterator<Item = (String, SourceValue)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
