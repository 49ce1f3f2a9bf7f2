//! Type checks for JSON payload values and query-string filter values.

use crate::model::FieldType;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

fn normalize_timestamp(s: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc).to_rfc3339())
}

fn normalize_date(s: &str) -> Option<String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn normalize_uuid(s: &str) -> Option<String> {
    uuid::Uuid::parse_str(s).ok().map(|u| u.to_string())
}

/// Check a non-null JSON value against a field type and return its canonical form
/// (timestamps in UTC RFC 3339, UUIDs lowercase hyphenated). Error is a short type description.
pub fn coerce_json(field_type: &FieldType, v: &Value) -> Result<Value, &'static str> {
    match field_type {
        FieldType::Text { .. } => v.as_str().map(|_| v.clone()).ok_or("a string"),
        FieldType::Integer => v
            .as_i64()
            .filter(|n| i32::try_from(*n).is_ok())
            .map(Value::from)
            .ok_or("a 32-bit integer"),
        FieldType::BigInt | FieldType::ForeignKey { .. } => v.as_i64().map(Value::from).ok_or("an integer"),
        FieldType::Float => v.as_f64().map(Value::from).ok_or("a number"),
        FieldType::Boolean => v.as_bool().map(Value::Bool).ok_or("a boolean"),
        FieldType::Timestamp => v
            .as_str()
            .and_then(normalize_timestamp)
            .map(Value::String)
            .ok_or("an RFC 3339 timestamp"),
        FieldType::Date => v
            .as_str()
            .and_then(normalize_date)
            .map(Value::String)
            .ok_or("a YYYY-MM-DD date"),
        FieldType::Uuid => v
            .as_str()
            .and_then(normalize_uuid)
            .map(Value::String)
            .ok_or("a UUID"),
        FieldType::Json => Ok(v.clone()),
    }
}

/// Parse a query-string value for a filter on a field. JSON columns are not filterable.
pub fn parse_query_value(field_type: &FieldType, s: &str) -> Result<Value, &'static str> {
    match field_type {
        FieldType::Text { .. } => Ok(Value::String(s.to_string())),
        FieldType::Integer => s
            .parse::<i32>()
            .map(Value::from)
            .map_err(|_| "a 32-bit integer"),
        FieldType::BigInt | FieldType::ForeignKey { .. } => {
            s.parse::<i64>().map(Value::from).map_err(|_| "an integer")
        }
        FieldType::Float => s
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::from)
            .ok_or("a number"),
        FieldType::Boolean => match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err("a boolean"),
        },
        FieldType::Timestamp => normalize_timestamp(s).map(Value::String).ok_or("an RFC 3339 timestamp"),
        FieldType::Date => normalize_date(s).map(Value::String).ok_or("a YYYY-MM-DD date"),
        FieldType::Uuid => normalize_uuid(s).map(Value::String).ok_or("a UUID"),
        FieldType::Json => Err("a filterable type (json fields cannot be filtered)"),
    }
}
