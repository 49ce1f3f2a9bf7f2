//! Standard response envelope helpers.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// 201 with `{ "data": ... }`.
pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::CREATED, Json(SuccessOne { data, meta: None }))
}

pub fn ok<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::OK, Json(SuccessOne { data, meta: None }))
}

/// Bulk writes: `{ "data": [...], "meta": { "count": n } }`.
pub fn many(status: StatusCode, data: Vec<Value>) -> (StatusCode, Json<SuccessOne<Vec<Value>>>) {
    let meta = Some(json!({ "count": data.len() }));
    (status, Json(SuccessOne { data, meta }))
}
