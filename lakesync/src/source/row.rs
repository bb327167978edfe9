//! Dynamic PgRow → SourceRecord decoding
//!
//! The extraction queries use `SELECT *` style projections, so column sets
//! are not known at compile time. Columns are decoded by dispatching on the
//! Postgres type name; anything undecodable becomes a missing marker instead
//! of failing the row.

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};
use uuid::Uuid;

use super::value::{SourceRecord, SourceValue};

/// Decode a dynamically-typed Postgres row into a SourceRecord.
///
/// Total per column: a decode error or an unsupported column type yields
/// `SourceValue::Missing` (logged), never an error for the whole row.
pub fn decode_row(row: &PgRow) -> SourceRecord {
    let mut record = SourceRecord::new();

    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let value = decode_column(row, idx, column.type_info().name());

        let value = match value {
            Ok(v) => v,
            Err(err) => {
                log::warn!(
                    "Failed to decode column '{}' ({}): {}",
                    name,
                    column.type_info().name(),
                    err
                );
                SourceValue::Missing
            }
        };

        record.insert(name, value);
    }

    record
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Result<SourceValue, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)?
            .map(SourceValue::Bool)
            .unwrap_or(SourceValue::Null),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)?
            .map(|i| SourceValue::Int(i as i64))
            .unwrap_or(SourceValue::Null),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)?
            .map(|i| SourceValue::Int(i as i64))
            .unwrap_or(SourceValue::Null),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)?
            .map(SourceValue::Int)
            .unwrap_or(SourceValue::Null),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|f| SourceValue::Float(f as f64))
            .unwrap_or(SourceValue::Null),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)?
            .map(SourceValue::Float)
            .unwrap_or(SourceValue::Null),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(idx)?
            .map(SourceValue::Guid)
            .unwrap_or(SourceValue::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)?
            .map(SourceValue::Timestamp)
            .unwrap_or(SourceValue::Null),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|ts| SourceValue::Timestamp(ts.and_utc()))
            .unwrap_or(SourceValue::Null),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map(|d| SourceValue::Text(d.to_string()))
            .unwrap_or(SourceValue::Null),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(idx)?
            .map(SourceValue::Bytes)
            .unwrap_or(SourceValue::Null),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(idx)?
            .map(SourceValue::Json)
            .unwrap_or(SourceValue::Null),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CITEXT" => row
            .try_get::<Option<String>, _>(idx)?
            .map(SourceValue::Text)
            .unwrap_or(SourceValue::Null),
        "TEXT[]" | "VARCHAR[]" => row
            .try_get::<Option<Vec<String>>, _>(idx)?
            .map(|items| SourceValue::Array(items.into_iter().map(SourceValue::Text).collect()))
            .unwrap_or(SourceValue::Null),
        "UUID[]" => row
            .try_get::<Option<Vec<Uuid>>, _>(idx)?
            .map(|items| SourceValue::Array(items.into_iter().map(SourceValue::Guid).collect()))
            .unwrap_or(SourceValue::Null),
        other => {
            log::warn!("Unsupported column type '{}', treating as missing", other);
            SourceValue::Missing
        }
    };

    Ok(value)
}
