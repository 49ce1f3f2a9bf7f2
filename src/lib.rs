//! CRUD scaffold: declare models, get validated REST endpoints over PostgreSQL.
//!
//! A [`ModelDef`] goes through [`generate`] to become a [`Resource`] (names plus
//! validation schema) and an [`EndpointSet`] (list, get, create, update, delete, plus count,
//! search, bulk and upsert routes).
//! [`RegistryBuilder`] checks all models together and [`build_app`] serves them.

pub mod case;
pub mod config;
pub mod error;
pub mod generator;
pub mod handlers;
pub mod logging;
pub mod migration;
pub mod model;
pub mod openapi;
pub mod registry;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{AppConfig, DatabaseConfig};
pub use error::{AppError, ConfigError};
pub use generator::{generate, EndpointSet, Generated, Operation, Resource, Target};
pub use logging::init_tracing;
pub use migration::ensure_tables;
pub use model::{load_from_dir, FieldDef, FieldType, Model, ModelDef};
pub use registry::{Registry, RegistryBuilder};
pub use routes::build_app;
pub use schema::ModelSchema;
pub use service::CrudService;
pub use state::AppState;
pub use store::{ensure_database_exists, MemoryStore, PgStore, Store};
