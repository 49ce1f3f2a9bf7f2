//! Model-to-endpoint generator: one model definition in, a schema plus its CRUD routes out.

use crate::case::{collection_name, humanize};
use crate::error::ConfigError;
use crate::handlers::resource as handlers;
use crate::model::ModelDef;
use crate::schema::{valid_identifier, ModelSchema, SchemaField};
use crate::state::ResourceState;
use crate::store::Store;
use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Everything generated for one model; shared read-only by its handlers.
#[derive(Clone, Debug)]
pub struct Resource {
    /// Model name as declared ("Widget").
    pub name: String,
    /// Human-readable plural ("Product categories"), used in API docs.
    pub label: String,
    pub path_segment: String,
    pub table: String,
    pub def: ModelDef,
    pub schema: ModelSchema,
}

impl Resource {
    /// The field upserts match on: the model's only unique input field. `None` when the
    /// model has no unique field or several, and then no upsert routes are generated.
    pub fn upsert_key(&self) -> Option<&SchemaField> {
        let mut unique = self.schema.unique_fields().filter(|f| f.access.accepts_input());
        match (unique.next(), unique.next()) {
            (Some(f), None) => Some(f),
            _ => None,
        }
    }
}

/// Where an operation is routed, relative to the collection path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Collection,
    Item,
    Count,
    Search,
    Many,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
    Count,
    Search,
    CreateMany,
    UpdateMany,
    Upsert,
    UpsertMany,
}

impl Operation {
    pub const ALL: [Operation; 11] = [
        Operation::List,
        Operation::Get,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
        Operation::Count,
        Operation::Search,
        Operation::CreateMany,
        Operation::UpdateMany,
        Operation::Upsert,
        Operation::UpsertMany,
    ];

    pub fn method(self) -> Method {
        match self {
            Operation::List | Operation::Get | Operation::Count => Method::GET,
            Operation::Create | Operation::Search | Operation::CreateMany => Method::POST,
            Operation::Update | Operation::UpdateMany => Method::PATCH,
            Operation::Upsert | Operation::UpsertMany => Method::PUT,
            Operation::Delete => Method::DELETE,
        }
    }

    pub fn target(self) -> Target {
        match self {
            Operation::List | Operation::Create | Operation::Upsert => Target::Collection,
            Operation::Get | Operation::Update | Operation::Delete => Target::Item,
            Operation::Count => Target::Count,
            Operation::Search => Target::Search,
            Operation::CreateMany | Operation::UpdateMany | Operation::UpsertMany => Target::Many,
        }
    }

    /// Whether the route carries an `{id}` path parameter.
    pub fn by_id(self) -> bool {
        self.target() == Target::Item
    }

    /// Upserts need an upsert key on the resource.
    pub fn needs_upsert_key(self) -> bool {
        matches!(self, Operation::Upsert | Operation::UpsertMany)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Count => "count",
            Operation::Search => "search",
            Operation::CreateMany => "create_many",
            Operation::UpdateMany => "update_many",
            Operation::Upsert => "upsert",
            Operation::UpsertMany => "upsert_many",
        }
    }
}

/// The generated endpoints of one resource.
#[derive(Clone, Debug)]
pub struct EndpointSet {
    resource: Arc<Resource>,
    collection_path: String,
}

impl EndpointSet {
    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    /// Full collection path including the API prefix, e.g. `/api/v1/widgets`.
    pub fn collection_path(&self) -> &str {
        &self.collection_path
    }

    /// `{id}` form, as used in API docs.
    pub fn item_path(&self) -> String {
        format!("{}/{{id}}", self.collection_path)
    }

    /// Full path of `target` in API-doc form.
    pub fn path(&self, target: Target) -> String {
        match target {
            Target::Collection => self.collection_path.clone(),
            Target::Item => self.item_path(),
            Target::Count => format!("{}/count", self.collection_path),
            Target::Search => format!("{}/search", self.collection_path),
            Target::Many => format!("{}/many", self.collection_path),
        }
    }

    /// Operations this resource serves; upserts only when it has an upsert key.
    pub fn operations(&self) -> Vec<Operation> {
        let upsert = self.resource.upsert_key().is_some();
        Operation::ALL
            .into_iter()
            .filter(|op| upsert || !op.needs_upsert_key())
            .collect()
    }

    /// `(operation, method, full path)` for each endpoint, in a fixed order.
    pub fn endpoints(&self) -> Vec<(Operation, Method, String)> {
        self.operations()
            .into_iter()
            .map(|op| (op, op.method(), self.path(op.target())))
            .collect()
    }

    /// Routes relative to the API prefix, with handlers bound to this resource.
    pub fn router(&self, store: Arc<dyn Store>) -> Router {
        let upsert = self.resource.upsert_key().is_some();
        let state = ResourceState {
            store,
            resource: self.resource.clone(),
        };
        let collection = format!("/{}", self.resource.path_segment);
        let mut collection_routes = get(handlers::list).post(handlers::create);
        let mut many_routes = post(handlers::create_many).patch(handlers::update_many);
        if upsert {
            collection_routes = collection_routes.put(handlers::upsert);
            many_routes = many_routes.put(handlers::upsert_many);
        }
        Router::new()
            .route(&collection, collection_routes)
            .route(&format!("{}/count", collection), get(handlers::count))
            .route(&format!("{}/search", collection), post(handlers::search))
            .route(&format!("{}/many", collection), many_routes)
            .route(
                &format!("{}/:id", collection),
                get(handlers::read)
                    .patch(handlers::update)
                    .delete(handlers::delete),
            )
            .with_state(state)
    }
}

pub struct Generated {
    pub resource: Arc<Resource>,
    pub endpoints: EndpointSet,
}

/// Trim trailing slashes and ensure a leading one; empty means routes at the root.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Derive names and schema for `def` and bind its endpoints under `api_prefix`.
pub fn generate(def: ModelDef, api_prefix: &str) -> Result<Generated, ConfigError> {
    if def.name.trim().is_empty() {
        return Err(ConfigError::InvalidIdentifier("model name is empty".into()));
    }
    let segment = collection_name(&def.name);
    if !valid_identifier(&segment) {
        return Err(ConfigError::InvalidIdentifier(format!(
            "model {} derives '{}'",
            def.name, segment
        )));
    }
    let schema = ModelSchema::derive(&def)?;
    let resource = Arc::new(Resource {
        name: def.name.clone(),
        label: humanize(&segment),
        path_segment: segment.clone(),
        table: segment.clone(),
        def,
        schema,
    });
    let endpoints = EndpointSet {
        resource: resource.clone(),
        collection_path: format!("{}/{}", normalize_prefix(api_prefix), segment),
    };
    Ok(Generated { resource, endpoints })
}
