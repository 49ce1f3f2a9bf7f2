//! Persistence seam for generated resources. `PgStore` runs the operations against PostgreSQL;
//! `MemoryStore` keeps rows in process with the same contract, for tests and local runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, PgStore};

use crate::error::AppError;
use crate::generator::Resource;
use crate::service::{Filter, Join, ListParams};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One stored record: column name to value, all schema columns present.
pub type Row = Map<String, Value>;

/// One page of a list query plus the number of rows matching its filters.
#[derive(Debug, Default)]
pub struct Page {
    pub rows: Vec<Row>,
    pub total: u64,
}

/// Each method is one logical transaction: its effect is either fully visible or not at all.
/// Bulk methods apply every item or none.
#[async_trait]
pub trait Store: Send + Sync {
    /// Connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), AppError>;

    async fn list(&self, resource: &Resource, params: &ListParams) -> Result<Page, AppError>;

    async fn count(&self, resource: &Resource, filters: &[Filter], join: Join) -> Result<u64, AppError>;

    async fn get(&self, resource: &Resource, id: i64) -> Result<Option<Row>, AppError>;

    /// Insert a validated payload; returns the stored row with server-assigned columns.
    async fn create(&self, resource: &Resource, body: &Row) -> Result<Row, AppError>;

    async fn create_many(&self, resource: &Resource, bodies: &[Row]) -> Result<Vec<Row>, AppError>;

    /// Apply a validated partial payload; `None` when no row has this id.
    async fn update(&self, resource: &Resource, id: i64, body: &Row) -> Result<Option<Row>, AppError>;

    /// Partial updates by id. A missing id is a not-found error and nothing is written.
    async fn update_many(&self, resource: &Resource, items: &[(i64, Row)]) -> Result<Vec<Row>, AppError>;

    /// Insert, or update the row sharing the resource's upsert key value. The flag is true
    /// when the row was inserted.
    async fn upsert(&self, resource: &Resource, body: &Row) -> Result<(Row, bool), AppError>;

    async fn upsert_many(&self, resource: &Resource, bodies: &[Row]) -> Result<Vec<Row>, AppError>;

    /// `false` when no row has this id.
    async fn delete(&self, resource: &Resource, id: i64) -> Result<bool, AppError>;
}
