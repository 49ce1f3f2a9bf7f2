//! Shared state handed to routes. Everything here is immutable after startup.

use crate::generator::Resource;
use crate::registry::Registry;
use crate::store::Store;
use std::sync::Arc;

/// App-wide state: readiness checks and API docs.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<Registry>,
}

/// Per-resource state: each generated router carries its own resource, so handlers never look
/// one up by path.
#[derive(Clone)]
pub struct ResourceState {
    pub store: Arc<dyn Store>,
    pub resource: Arc<Resource>,
}
