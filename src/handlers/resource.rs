//! CRUD handlers shared by every generated resource. The resource comes from router state.

use crate::error::AppError;
use crate::response;
use crate::service::CrudService;
use crate::state::ResourceState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;

type QueryPairs = Result<Query<Vec<(String, String)>>, QueryRejection>;

fn parse_id(id_str: &str) -> Result<i64, AppError> {
    id_str
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid id '{}'", id_str)))
}

/// Body rejections in the standard error shape, not axum's plain text. An over-limit body
/// stays a 413.
fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    body.map(|Json(v)| v).map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(e.body_text())
        } else {
            AppError::BadRequest(e.body_text())
        }
    })
}

fn query_pairs(query: QueryPairs) -> Result<Vec<(String, String)>, AppError> {
    query
        .map(|Query(pairs)| pairs)
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

fn service(state: &ResourceState) -> CrudService<'_> {
    CrudService::new(&state.resource, state.store.as_ref())
}

pub async fn list(State(state): State<ResourceState>, query: QueryPairs) -> Result<impl IntoResponse, AppError> {
    let result = service(&state).list(&query_pairs(query)?).await?;
    Ok(Json(result))
}

pub async fn count(State(state): State<ResourceState>, query: QueryPairs) -> Result<impl IntoResponse, AppError> {
    let count = service(&state).count(&query_pairs(query)?).await?;
    Ok(response::ok(serde_json::json!({ "count": count })))
}

pub async fn search(
    State(state): State<ResourceState>,
    query: QueryPairs,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let query = query_pairs(query)?;
    let result = service(&state).search(&query, json_body(body)?).await?;
    Ok(Json(result))
}

pub async fn create(
    State(state): State<ResourceState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let row = service(&state).create(json_body(body)?).await?;
    Ok(response::created(row))
}

pub async fn create_many(
    State(state): State<ResourceState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let rows = service(&state).create_many(json_body(body)?).await?;
    Ok(response::many(StatusCode::CREATED, rows))
}

pub async fn update_many(
    State(state): State<ResourceState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let rows = service(&state).update_many(json_body(body)?).await?;
    Ok(response::many(StatusCode::OK, rows))
}

/// 201 when the record was inserted, 200 when an existing one was updated.
pub async fn upsert(
    State(state): State<ResourceState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let upserted = service(&state).upsert(json_body(body)?).await?;
    Ok(if upserted.inserted {
        response::created(upserted.record)
    } else {
        response::ok(upserted.record)
    })
}

pub async fn upsert_many(
    State(state): State<ResourceState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let rows = service(&state).upsert_many(json_body(body)?).await?;
    Ok(response::many(StatusCode::OK, rows))
}

pub async fn read(
    State(state): State<ResourceState>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id_str)?;
    let row = service(&state).get(id).await?;
    Ok(response::ok(row))
}

pub async fn update(
    State(state): State<ResourceState>,
    Path(id_str): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id_str)?;
    let row = service(&state).update(id, json_body(body)?).await?;
    Ok(response::ok(row))
}

pub async fn delete(
    State(state): State<ResourceState>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id_str)?;
    service(&state).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
