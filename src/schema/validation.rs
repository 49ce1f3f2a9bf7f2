//! Payload validation: create (full) and update (partial) views of the schema.

use super::{coerce_json, ModelSchema, SchemaField};
use crate::error::AppError;
use serde_json::{Map, Value};

impl ModelSchema {
    /// Validate a create payload. All required input fields must be present; unknown and
    /// server-assigned keys are rejected. Returns the canonicalized payload.
    pub fn validate_create(&self, body: Value) -> Result<Map<String, Value>, AppError> {
        let body = self.validate_keys(body)?;
        for f in self.input_fields() {
            if f.required_on_create && body.get(&f.name).map_or(true, Value::is_null) {
                return Err(AppError::Validation(format!("{} is required", f.name)));
            }
        }
        self.validate_values(body)
    }

    /// Validate an update payload: any subset of input fields. Required is not enforced for
    /// missing fields, but an explicit null on a non-nullable field is rejected.
    pub fn validate_update(&self, body: Value) -> Result<Map<String, Value>, AppError> {
        let body = self.validate_keys(body)?;
        self.validate_values(body)
    }

    fn validate_keys(&self, body: Value) -> Result<Map<String, Value>, AppError> {
        let Value::Object(map) = body else {
            return Err(AppError::BadRequest("body must be a JSON object".into()));
        };
        for key in map.keys() {
            match self.field(key) {
                None => return Err(AppError::Validation(format!("unknown field '{}'", key))),
                Some(f) if !f.access.accepts_input() => {
                    return Err(AppError::Validation(format!("field '{}' is read-only", key)))
                }
                Some(_) => {}
            }
        }
        Ok(map)
    }

    fn validate_values(&self, body: Map<String, Value>) -> Result<Map<String, Value>, AppError> {
        let mut out = Map::with_capacity(body.len());
        for (key, v) in body {
            let Some(f) = self.field(&key) else { continue };
            let v = validate_field(f, &v)?;
            out.insert(key, v);
        }
        Ok(out)
    }
}

fn validate_field(f: &SchemaField, v: &Value) -> Result<Value, AppError> {
    let col = f.name.as_str();
    if v.is_null() {
        if f.nullable {
            return Ok(Value::Null);
        }
        return Err(AppError::Validation(format!("{} may not be null", col)));
    }
    let v = coerce_json(&f.field_type, v)
        .map_err(|expected| AppError::Validation(format!("{} must be {}", col, expected)))?;
    let rules = &f.rules;
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rules.max_length {
            if len > max as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at most {} characters",
                    col, max
                )));
            }
        }
        if let Some(min) = rules.min_length {
            if len < min as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at least {} characters",
                    col, min
                )));
            }
        }
        if let Some(re) = &f.pattern {
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(allowed) = &rules.allowed {
        if !allowed.iter().any(|a| value_eq(&v, a)) {
            return Err(AppError::Validation(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rules.minimum {
            if n < min {
                return Err(AppError::Validation(format!("{} must be at least {}", col, min)));
            }
        }
        if let Some(max) = rules.maximum {
            if n > max {
                return Err(AppError::Validation(format!("{} must be at most {}", col, max)));
            }
        }
    }
    Ok(v)
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}
