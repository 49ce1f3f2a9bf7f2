//! HTTP-level tests of the generated endpoints against the in-memory store.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use crud_scaffold::routes::MAX_BODY_BYTES;
use crud_scaffold::service::{Filter, Join, ListParams};
use crud_scaffold::store::{Page, Row};
use crud_scaffold::{
    build_app, AppError, FieldDef, MemoryStore, ModelDef, Registry, RegistryBuilder, Resource, Store,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    build_app(Arc::new(registry()), Arc::new(MemoryStore::new()), "test")
}

fn registry() -> Registry {
    RegistryBuilder::default()
        .definition(
            ModelDef::new("Widget")
                .field(FieldDef::text("name"))
                .field(FieldDef::integer("quantity")),
        )
        .definition(
            ModelDef::new("Note")
                .field(FieldDef::varchar("title", 256).unique())
                .field(FieldDef::text("body"))
                .field(FieldDef::integer("rating").range(1.0, 5.0)),
        )
        .definition(
            ModelDef::new("Account")
                .field(FieldDef::text("email").unique())
                .field(FieldDef::text("password").write_only())
                .field(FieldDef::foreign_key("note_id", "Note").nullable()),
        )
        .build()
        .unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn without(mut v: Value, keys: &[&str]) -> Value {
    if let Some(map) = v.as_object_mut() {
        for k in keys {
            map.remove(*k);
        }
    }
    v
}

#[tokio::test]
async fn widget_lifecycle() {
    let app = app();
    let (status, created) = send(
        &app,
        Method::POST,
        "/api/v1/widgets",
        Some(json!({"name": "bolt", "quantity": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["id"].as_i64().unwrap();

    let (status, got) = send(&app, Method::GET, &format!("/api/v1/widgets/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(got["data"]["name"], "bolt");
    assert_eq!(got["data"]["quantity"], 5);

    let (status, body) = send(&app, Method::DELETE, &format!("/api/v1/widgets/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, err) = send(&app, Method::GET, &format!("/api/v1/widgets/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["error"]["code"], "not_found");
}

#[tokio::test]
async fn create_then_get_returns_payload_plus_server_fields() {
    let app = app();
    let input = json!({"title": "hello", "body": "world", "rating": 4});
    let (status, created) = send(&app, Method::POST, "/api/v1/notes", Some(input.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let record = &created["data"];
    assert!(record["id"].is_i64());
    assert!(record["created_at"].is_string());
    assert!(record["updated_at"].is_string());
    assert_eq!(record["is_active"], true);

    let (_, got) = send(&app, Method::GET, &format!("/api/v1/notes/{}", record["id"]), None).await;
    assert_eq!(&got["data"], record);
    assert_eq!(
        without(got["data"].clone(), &["id", "created_at", "updated_at", "is_active"]),
        input
    );
}

#[tokio::test]
async fn repeated_full_update_changes_only_updated_at() {
    let app = app();
    let (_, created) = send(
        &app,
        Method::POST,
        "/api/v1/notes",
        Some(json!({"title": "a", "body": "b", "rating": 1})),
    )
    .await;
    let uri = format!("/api/v1/notes/{}", created["data"]["id"]);
    let payload = json!({"title": "c", "body": "d", "rating": 2, "is_active": false});

    let (status, first) = send(&app, Method::PATCH, &uri, Some(payload.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, second) = send(&app, Method::PATCH, &uri, Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        without(first["data"].clone(), &["updated_at"]),
        without(second["data"].clone(), &["updated_at"])
    );
    assert_eq!(second["data"]["title"], "c");
    assert_eq!(second["data"]["is_active"], false);
    assert_eq!(second["data"]["created_at"], created["data"]["created_at"]);
}

#[tokio::test]
async fn absent_keys_are_not_found() {
    let app = app();
    let (status, _) = send(&app, Method::GET, "/api/v1/widgets/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::PATCH, "/api/v1/widgets/99", Some(json!({"quantity": 1}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::DELETE, "/api/v1/widgets/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_returns_all_and_rejects_unknown_filters() {
    let app = app();
    for (name, quantity) in [("bolt", 5), ("nut", 2), ("washer", 9)] {
        send(
            &app,
            Method::POST,
            "/api/v1/widgets",
            Some(json!({"name": name, "quantity": quantity})),
        )
        .await;
    }
    let (status, all) = send(&app, Method::GET, "/api/v1/widgets", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["data"].as_array().unwrap().len(), 3);
    assert_eq!(all["meta"], json!({"count": 3, "total": 3, "limit": 100, "offset": 0}));

    let (status, err) = send(&app, Method::GET, "/api/v1/widgets?colour=red", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"]["code"], "validation_error");
}

#[tokio::test]
async fn list_filters_orders_and_paginates() {
    let app = app();
    for (name, quantity) in [("a", 5), ("b", 2), ("c", 9), ("d", 5)] {
        send(
            &app,
            Method::POST,
            "/api/v1/widgets",
            Some(json!({"name": name, "quantity": quantity})),
        )
        .await;
    }
    let (status, page) = send(
        &app,
        Method::GET,
        "/api/v1/widgets?quantity_min=3&order_by=-quantity&limit=2&offset=1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = page["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["a", "d"]);
    assert_eq!(page["meta"], json!({"count": 2, "total": 3, "limit": 2, "offset": 1}));

    let (_, exact) = send(&app, Method::GET, "/api/v1/widgets?name=b", None).await;
    assert_eq!(exact["meta"]["total"], 1);

    let (status, _) = send(&app, Method::GET, "/api/v1/widgets?limit=0", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn payload_errors() {
    let app = app();
    let (status, err) = send(&app, Method::POST, "/api/v1/notes", Some(json!({"title": "x"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"]["message"], "validation: body is required");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/notes",
        Some(json!({"title": "x", "body": "y", "rating": 6})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/widgets",
        Some(json!({"name": "bolt", "quantity": 1, "id": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, err) = send(&app, Method::POST, "/api/v1/widgets", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"]["code"], "bad_request");

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/widgets")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/v1/widgets/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unique_and_reference_conflicts() {
    let app = app();
    let note = json!({"title": "same", "body": "b", "rating": 3});
    let (status, _) = send(&app, Method::POST, "/api/v1/notes", Some(note.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, err) = send(&app, Method::POST, "/api/v1/notes", Some(note)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"]["code"], "conflict");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/accounts",
        Some(json!({"email": "a@example.com", "password": "pw", "note_id": 42})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn write_only_fields_are_accepted_but_never_returned() {
    let app = app();
    let (status, created) = send(
        &app,
        Method::POST,
        "/api/v1/accounts",
        Some(json!({"email": "a@example.com", "password": "hunter2"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["data"].get("password").is_none());
    assert_eq!(created["data"]["note_id"], Value::Null);

    let (_, listed) = send(&app, Method::GET, "/api/v1/accounts", None).await;
    assert!(listed["data"][0].get("password").is_none());

    let (status, _) = send(&app, Method::GET, "/api/v1/accounts?password=hunter2", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn common_routes() {
    let app = app();
    let (status, health) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");

    let (status, ready) = send(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ready["database"], "ok");

    let (_, version) = send(&app, Method::GET, "/version", None).await;
    assert_eq!(version["resources"], json!(["widgets", "notes", "accounts"]));

    let (status, doc) = send(&app, Method::GET, "/schema/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/v1/widgets/{id}"]["patch"].is_object());
}

/// Every call fails the way a dropped database connection does.
struct DownStore;

fn down<T>() -> Result<T, AppError> {
    Err(AppError::from(sqlx::Error::PoolTimedOut))
}

#[async_trait]
impl Store for DownStore {
    async fn ping(&self) -> Result<(), AppError> {
        down()
    }
    async fn list(&self, _: &Resource, _: &ListParams) -> Result<Page, AppError> {
        down()
    }
    async fn count(&self, _: &Resource, _: &[Filter], _: Join) -> Result<u64, AppError> {
        down()
    }
    async fn get(&self, _: &Resource, _: i64) -> Result<Option<Row>, AppError> {
        down()
    }
    async fn create(&self, _: &Resource, _: &Row) -> Result<Row, AppError> {
        down()
    }
    async fn create_many(&self, _: &Resource, _: &[Row]) -> Result<Vec<Row>, AppError> {
        down()
    }
    async fn update(&self, _: &Resource, _: i64, _: &Row) -> Result<Option<Row>, AppError> {
        down()
    }
    async fn update_many(&self, _: &Resource, _: &[(i64, Row)]) -> Result<Vec<Row>, AppError> {
        down()
    }
    async fn upsert(&self, _: &Resource, _: &Row) -> Result<(Row, bool), AppError> {
        down()
    }
    async fn upsert_many(&self, _: &Resource, _: &[Row]) -> Result<Vec<Row>, AppError> {
        down()
    }
    async fn delete(&self, _: &Resource, _: i64) -> Result<bool, AppError> {
        down()
    }
}

#[tokio::test]
async fn lost_database_is_retryable_unavailable() {
    let app = build_app(Arc::new(registry()), Arc::new(DownStore), "test");

    let (status, err) = send(&app, Method::GET, "/api/v1/widgets", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(err["error"]["code"], "service_unavailable");
    assert_eq!(err["error"]["details"], json!({"retryable": true}));

    let (status, err) = send(
        &app,
        Method::POST,
        "/api/v1/widgets",
        Some(json!({"name": "bolt", "quantity": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(err["error"]["details"]["retryable"], true);

    let (status, ready) = send(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(ready, json!({"status": "degraded", "database": "unavailable"}));

    let (status, _) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn oversized_body_is_413_in_error_shape() {
    let app = app();
    let big = json!({"name": "x".repeat(MAX_BODY_BYTES), "quantity": 1});
    let (status, err) = send(&app, Method::POST, "/api/v1/widgets", Some(big)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(err["error"]["code"], "payload_too_large");
    assert!(err["error"]["message"].is_string());
}

#[tokio::test]
async fn query_errors_use_error_shape() {
    let app = app();
    let (status, err) = send(&app, Method::GET, "/api/v1/widgets?limit", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"]["code"], "validation_error");

    let (status, err) = send(&app, Method::GET, "/api/v1/widgets/count?limit=2", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"]["message"], "validation: unknown filter field 'limit'");
}

async fn seed_widgets(app: &Router) {
    let (status, created) = send(
        app,
        Method::POST,
        "/api/v1/widgets/many",
        Some(json!([
            {"name": "Hex Bolt", "quantity": 3},
            {"name": "nut", "quantity": 1},
            {"name": "bolt cutter", "quantity": 9},
            {"name": "washer", "quantity": 12}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["meta"], json!({"count": 4}));
}

#[tokio::test]
async fn count_applies_list_filters() {
    let app = app();
    seed_widgets(&app).await;
    let (status, all) = send(&app, Method::GET, "/api/v1/widgets/count", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all, json!({"data": {"count": 4}}));

    let (_, some) = send(&app, Method::GET, "/api/v1/widgets/count?quantity_min=3&quantity_max=9", None).await;
    assert_eq!(some["data"]["count"], 2);
}

#[tokio::test]
async fn search_joins_criteria_and_matches_text_substrings() {
    let app = app();
    seed_widgets(&app).await;
    let names = |page: &Value| -> Vec<String> {
        page["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect()
    };

    let (status, and) = send(
        &app,
        Method::POST,
        "/api/v1/widgets/search",
        Some(json!({"name": "BOLT", "quantity_max": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&and), ["Hex Bolt"]);

    let (_, or) = send(
        &app,
        Method::POST,
        "/api/v1/widgets/search?join=or&order_by=-quantity",
        Some(json!({"name": "bolt", "quantity_min": 10})),
    )
    .await;
    assert_eq!(names(&or), ["washer", "bolt cutter", "Hex Bolt"]);
    assert_eq!(or["meta"]["total"], 3);

    let (status, _) = send(&app, Method::POST, "/api/v1/widgets/search?join=xor", Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn bulk_writes_apply_all_or_nothing() {
    let app = app();
    seed_widgets(&app).await;

    let (status, err) = send(
        &app,
        Method::POST,
        "/api/v1/widgets/many",
        Some(json!([{"name": "gear", "quantity": 1}, {"name": "cog"}])),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"]["message"], "validation: item 1: quantity is required");

    let (status, updated) = send(
        &app,
        Method::PATCH,
        "/api/v1/widgets/many",
        Some(json!([{"id": 1, "quantity": 30}, {"id": 2, "name": "lock nut"}])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"][0]["quantity"], 30);
    assert_eq!(updated["data"][1]["name"], "lock nut");

    let (status, _) = send(
        &app,
        Method::PATCH,
        "/api/v1/widgets/many",
        Some(json!([{"id": 3, "quantity": 0}, {"id": 99, "quantity": 0}])),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, third) = send(&app, Method::GET, "/api/v1/widgets/3", None).await;
    assert_eq!(third["data"]["quantity"], 9);

    let (_, count) = send(&app, Method::GET, "/api/v1/widgets/count", None).await;
    assert_eq!(count["data"]["count"], 4);
}

#[tokio::test]
async fn upsert_by_unique_field() {
    let app = app();
    let note = json!({"title": "todo", "body": "first", "rating": 2});
    let (status, inserted) = send(&app, Method::PUT, "/api/v1/notes", Some(note)).await;
    assert_eq!(status, StatusCode::CREATED);

    let again = json!({"title": "todo", "body": "second", "rating": 4});
    let (status, updated) = send(&app, Method::PUT, "/api/v1/notes", Some(again)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["id"], inserted["data"]["id"]);
    assert_eq!(updated["data"]["body"], "second");
    assert_eq!(updated["data"]["created_at"], inserted["data"]["created_at"]);

    let (status, many) = send(
        &app,
        Method::PUT,
        "/api/v1/notes/many",
        Some(json!([
            {"title": "todo", "body": "third", "rating": 5},
            {"title": "done", "body": "b", "rating": 1}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(many["data"][0]["id"], inserted["data"]["id"]);
    assert_eq!(many["meta"]["count"], 2);

    // Widgets have no unique field, so there is nothing to upsert on.
    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/v1/widgets",
        Some(json!({"name": "bolt", "quantity": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
