//! CrudService: the generated operations over a resource, plus list and search query parsing.

mod crud;
mod query;
pub use crud::{CrudService, ListMeta, ListResult, Upserted, BULK_LIMIT};
pub use query::{Filter, FilterOp, Join, ListParams, OrderBy, DEFAULT_LIMIT, MAX_LIMIT};
