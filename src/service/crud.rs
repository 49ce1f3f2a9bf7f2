//! CRUD operations for one resource: validate, hit the store, project the read view.

use super::query::{Join, ListParams};
use crate::error::AppError;
use crate::generator::Resource;
use crate::model::ID_FIELD;
use crate::store::{Row, Store};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Serialize)]
pub struct ListMeta {
    /// Rows in this page.
    pub count: u64,
    /// Rows matching the filters across all pages.
    pub total: u64,
    pub limit: u32,
    pub offset: u64,
}

#[derive(Debug, Serialize)]
pub struct ListResult {
    pub data: Vec<Value>,
    pub meta: ListMeta,
}

/// Result of an upsert: the stored record and whether it was newly inserted.
#[derive(Debug)]
pub struct Upserted {
    pub record: Value,
    pub inserted: bool,
}

/// Items per bulk request.
pub const BULK_LIMIT: usize = 100;

/// A bulk body: a JSON array of 1 to [`BULK_LIMIT`] items.
fn bulk_items(body: Value) -> Result<Vec<Value>, AppError> {
    let Value::Array(items) = body else {
        return Err(AppError::BadRequest("body must be a JSON array".into()));
    };
    if items.is_empty() {
        return Err(AppError::Validation("at least one item is required".into()));
    }
    if items.len() > BULK_LIMIT {
        return Err(AppError::BadRequest(format!("bulk requests are limited to {} items", BULK_LIMIT)));
    }
    Ok(items)
}

/// Prefix an item error with its position in the bulk body.
fn at_item(index: usize, e: AppError) -> AppError {
    match e {
        AppError::Validation(m) => AppError::Validation(format!("item {}: {}", index, m)),
        AppError::BadRequest(m) => AppError::BadRequest(format!("item {}: {}", index, m)),
        other => other,
    }
}

/// Split the required integer `id` off a bulk update item.
fn take_id(item: Value) -> Result<(i64, Value), AppError> {
    let Value::Object(mut map) = item else {
        return Err(AppError::BadRequest("body must be a JSON object".into()));
    };
    let id = map
        .remove(ID_FIELD)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| AppError::Validation("id is required and must be an integer".into()))?;
    Ok((id, Value::Object(map)))
}

pub struct CrudService<'a> {
    resource: &'a Resource,
    store: &'a dyn Store,
}

impl<'a> CrudService<'a> {
    pub fn new(resource: &'a Resource, store: &'a dyn Store) -> Self {
        CrudService { resource, store }
    }

    fn not_found(&self, id: i64) -> AppError {
        AppError::NotFound(format!("{} {}", self.resource.name, id))
    }

    /// List rows matching the query-string filters, one page at a time.
    pub async fn list(&self, query: &[(String, String)]) -> Result<ListResult, AppError> {
        let params = ListParams::parse(&self.resource.schema, query)?;
        self.page(params).await
    }

    /// Rows matching the query-string filters.
    pub async fn count(&self, query: &[(String, String)]) -> Result<u64, AppError> {
        let filters = ListParams::parse_filters(&self.resource.schema, query)?;
        self.store
            .count(self.resource, &filters, Join::And)
            .await
    }

    /// List rows matching the criteria in `body`, joined by the `join` query parameter.
    pub async fn search(&self, query: &[(String, String)], body: Value) -> Result<ListResult, AppError> {
        let params = ListParams::parse_search(&self.resource.schema, query, body)?;
        self.page(params).await
    }

    async fn page(&self, params: ListParams) -> Result<ListResult, AppError> {
        let page = self.store.list(self.resource, &params).await?;
        let data: Vec<Value> = page
            .rows
            .into_iter()
            .map(|r| self.resource.schema.project_output(r))
            .collect();
        Ok(ListResult {
            meta: ListMeta {
                count: data.len() as u64,
                total: page.total,
                limit: params.limit,
                offset: params.offset,
            },
            data,
        })
    }

    fn project_all(&self, rows: Vec<Row>) -> Vec<Value> {
        rows.into_iter()
            .map(|r| self.resource.schema.project_output(r))
            .collect()
    }

    pub async fn get(&self, id: i64) -> Result<Value, AppError> {
        let row = self
            .store
            .get(self.resource, id)
            .await?
            .ok_or_else(|| self.not_found(id))?;
        Ok(self.resource.schema.project_output(row))
    }

    pub async fn create(&self, body: Value) -> Result<Value, AppError> {
        let body = self.resource.schema.validate_create(body)?;
        let row = self.store.create(self.resource, &body).await?;
        tracing::debug!(resource = %self.resource.name, id = ?row.get("id"), "created");
        Ok(self.resource.schema.project_output(row))
    }

    /// Create every item of a JSON array in one transaction.
    pub async fn create_many(&self, body: Value) -> Result<Vec<Value>, AppError> {
        let bodies = bulk_items(body)?
            .into_iter()
            .enumerate()
            .map(|(i, item)| self.resource.schema.validate_create(item).map_err(|e| at_item(i, e)))
            .collect::<Result<Vec<Map<String, Value>>, _>>()?;
        let rows = self.store.create_many(self.resource, &bodies).await?;
        tracing::debug!(resource = %self.resource.name, count = rows.len(), "created many");
        Ok(self.project_all(rows))
    }

    /// Partial updates keyed by each item's `id`, in one transaction.
    pub async fn update_many(&self, body: Value) -> Result<Vec<Value>, AppError> {
        let items = bulk_items(body)?
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let (id, rest) = take_id(item).map_err(|e| at_item(i, e))?;
                let rest = self.resource.schema.validate_update(rest).map_err(|e| at_item(i, e))?;
                Ok((id, rest))
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        let rows = self.store.update_many(self.resource, &items).await?;
        Ok(self.project_all(rows))
    }

    /// Create, or update the record holding the same upsert-key value.
    pub async fn upsert(&self, body: Value) -> Result<Upserted, AppError> {
        let body = self.resource.schema.validate_create(body)?;
        let (row, inserted) = self.store.upsert(self.resource, &body).await?;
        Ok(Upserted {
            record: self.resource.schema.project_output(row),
            inserted,
        })
    }

    pub async fn upsert_many(&self, body: Value) -> Result<Vec<Value>, AppError> {
        let bodies = bulk_items(body)?
            .into_iter()
            .enumerate()
            .map(|(i, item)| self.resource.schema.validate_create(item).map_err(|e| at_item(i, e)))
            .collect::<Result<Vec<Map<String, Value>>, _>>()?;
        let rows = self.store.upsert_many(self.resource, &bodies).await?;
        Ok(self.project_all(rows))
    }

    /// Partial update; `updated_at` is refreshed even when no column changes.
    pub async fn update(&self, id: i64, body: Value) -> Result<Value, AppError> {
        let body = self.resource.schema.validate_update(body)?;
        let row = self
            .store
            .update(self.resource, id, &body)
            .await?
            .ok_or_else(|| self.not_found(id))?;
        Ok(self.resource.schema.project_output(row))
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        if !self.store.delete(self.resource, id).await? {
            return Err(self.not_found(id));
        }
        tracing::debug!(resource = %self.resource.name, id, "deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::generate;
    use crate::model::{FieldDef, ModelDef};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn account() -> Resource {
        let def = ModelDef::new("Account")
            .field(FieldDef::varchar("email", 120).unique())
            .field(FieldDef::text("password").write_only());
        generate(def, "/api/v1").unwrap().resource.as_ref().clone()
    }

    #[tokio::test]
    async fn write_only_fields_never_come_back() {
        let store = MemoryStore::new();
        let res = account();
        let svc = CrudService::new(&res, &store);
        let created = svc
            .create(json!({"email": "a@example.com", "password": "hunter2"}))
            .await
            .unwrap();
        assert!(created.get("password").is_none());
        let id = created["id"].as_i64().unwrap();
        assert!(svc.get(id).await.unwrap().get("password").is_none());
        let listed = svc.list(&[]).await.unwrap();
        assert!(listed.data[0].get("password").is_none());
        assert_eq!(listed.meta.total, 1);
    }

    #[tokio::test]
    async fn absent_ids_are_not_found() {
        let store = MemoryStore::new();
        let res = account();
        let svc = CrudService::new(&res, &store);
        assert!(matches!(svc.get(3).await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.update(3, json!({})).await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.delete(3).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn bulk_errors_name_the_item() {
        let store = MemoryStore::new();
        let res = account();
        let svc = CrudService::new(&res, &store);
        let err = svc
            .create_many(json!([
                {"email": "a@example.com", "password": "x"},
                {"email": "b@example.com"}
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m == "item 1: password is required"));
        assert!(matches!(svc.create_many(json!([])).await, Err(AppError::Validation(_))));
        assert!(matches!(svc.create_many(json!({})).await, Err(AppError::BadRequest(_))));
        let too_many: Vec<Value> = (0..=BULK_LIMIT).map(|_| json!({})).collect();
        assert!(matches!(
            svc.create_many(Value::Array(too_many)).await,
            Err(AppError::BadRequest(m)) if m.contains("limited to 100")
        ));

        let err = svc.update_many(json!([{"email": "c@example.com"}])).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m.starts_with("item 0: id is required")));
        assert_eq!(svc.count(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_reports_insert_then_update() {
        let store = MemoryStore::new();
        let res = account();
        let svc = CrudService::new(&res, &store);
        let first = svc
            .upsert(json!({"email": "a@example.com", "password": "x"}))
            .await
            .unwrap();
        assert!(first.inserted);
        let second = svc
            .upsert(json!({"email": "a@example.com", "password": "y"}))
            .await
            .unwrap();
        assert!(!second.inserted);
        assert_eq!(second.record["id"], first.record["id"]);
        assert!(second.record.get("password").is_none());
    }

    #[tokio::test]
    async fn invalid_payload_never_reaches_store() {
        let store = MemoryStore::new();
        let res = account();
        let svc = CrudService::new(&res, &store);
        let err = svc.create(json!({"email": "a@example.com"})).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m == "password is required"));
        assert_eq!(svc.list(&[]).await.unwrap().meta.total, 0);
    }
}
