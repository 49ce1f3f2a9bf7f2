//! Bind values as text; every placeholder carries an explicit cast to the column type
//! (`$1::integer`, `$2::timestamptz`), so PostgreSQL performs the conversion.

use serde_json::Value;

/// Text form of a JSON value for a `$n::type` placeholder. `None` binds SQL NULL.
pub fn text_param(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => Some(v.to_string()),
    }
}
