//! Router assembly: common routes plus every generated resource under the API prefix.

mod common;

pub use common::common_routes;

use crate::openapi;
use crate::registry::Registry;
use crate::state::AppState;
use crate::store::Store;
use axum::extract::DefaultBodyLimit;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Request bodies above this size are rejected with 413 in the standard error shape.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// The full application router. `title` names the API in its OpenAPI document.
pub fn build_app(registry: Arc<Registry>, store: Arc<dyn Store>, title: &str) -> Router {
    let doc = serde_json::to_value(openapi::document(&registry, title)).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "openapi document not serializable");
        serde_json::Value::Null
    });
    for set in registry.endpoint_sets() {
        for (op, method, path) in set.endpoints() {
            tracing::info!(model = %set.resource().name, operation = op.as_str(), %method, %path, "route");
        }
    }
    let resources = registry.router(store.clone());
    let api = if registry.api_prefix().is_empty() {
        resources
    } else {
        Router::new().nest(registry.api_prefix(), resources)
    };
    let state = AppState {
        store,
        registry: registry.clone(),
    };
    common_routes(state, Arc::new(doc))
        .merge(api)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}
