//! In-process store with the same contract as `PgStore`: server-assigned columns, defaults,
//! unique and foreign-key conflicts, filtering, ordering and pagination.

use crate::error::AppError;
use crate::generator::Resource;
use crate::model::{FieldDefault, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
use crate::service::{Filter, FilterOp, Join, ListParams};
use crate::store::{Page, Row, Store};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Clone, Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, Row>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Table>,
    /// Referenced table -> (referencing table, column), learned as resources are written.
    references: HashMap<String, Vec<(String, String)>>,
}

impl Inner {
    fn learn_references(&mut self, resource: &Resource) {
        for f in &resource.schema.fields {
            let Some(target) = &f.references_table else { continue };
            let entry = self.references.entry(target.clone()).or_default();
            let link = (resource.table.clone(), f.name.clone());
            if !entry.contains(&link) {
                entry.push(link);
            }
        }
    }

    fn check_unique(&self, resource: &Resource, row: &Row, self_id: Option<i64>) -> Result<(), AppError> {
        let Some(table) = self.tables.get(&resource.table) else {
            return Ok(());
        };
        for f in resource.schema.unique_fields() {
            let v = row.get(&f.name).unwrap_or(&Value::Null);
            if v.is_null() {
                continue;
            }
            let clash = table
                .rows
                .iter()
                .any(|(id, other)| Some(*id) != self_id && other.get(&f.name) == Some(v));
            if clash {
                return Err(AppError::Conflict(format!(
                    "duplicate value for unique field {} on {}",
                    f.name, resource.table
                )));
            }
        }
        Ok(())
    }

    fn check_foreign_keys(&self, resource: &Resource, row: &Row) -> Result<(), AppError> {
        for f in &resource.schema.fields {
            let Some(target) = &f.references_table else { continue };
            let Some(id) = row.get(&f.name).and_then(Value::as_i64) else { continue };
            let exists = self
                .tables
                .get(target)
                .map_or(false, |t| t.rows.contains_key(&id));
            if !exists {
                return Err(AppError::Conflict(format!(
                    "{} references missing {} row {}",
                    f.name, target, id
                )));
            }
        }
        Ok(())
    }

    fn check_not_referenced(&self, table: &str, id: i64) -> Result<(), AppError> {
        let Some(links) = self.references.get(table) else {
            return Ok(());
        };
        for (referencing, column) in links {
            // A row pointing at itself goes away with the delete.
            let used = self.tables.get(referencing).map_or(false, |t| {
                t.rows.iter().any(|(row_id, r)| {
                    !(referencing == table && *row_id == id)
                        && r.get(column).and_then(Value::as_i64) == Some(id)
                })
            });
            if used {
                return Err(AppError::Conflict(format!(
                    "{} row {} is still referenced by {}.{}",
                    table, id, referencing, column
                )));
            }
        }
        Ok(())
    }

    fn insert(&mut self, resource: &Resource, body: &Row) -> Result<Row, AppError> {
        let mut row = Row::new();
        for f in &resource.schema.fields {
            let v = match body.get(&f.name) {
                Some(v) if f.access.accepts_input() => v.clone(),
                _ => match &f.default {
                    Some(FieldDefault::Value(v)) => v.clone(),
                    Some(FieldDefault::Expression(e)) => eval_expression(e),
                    None => Value::Null,
                },
            };
            row.insert(f.name.clone(), v);
        }
        self.check_unique(resource, &row, None)?;
        self.check_foreign_keys(resource, &row)?;

        let table = self.tables.entry(resource.table.clone()).or_default();
        table.next_id += 1;
        let id = table.next_id;
        let ts = now();
        row.insert(ID_FIELD.to_string(), Value::from(id));
        row.insert(CREATED_AT_FIELD.to_string(), ts.clone());
        row.insert(UPDATED_AT_FIELD.to_string(), ts);
        table.rows.insert(id, row.clone());
        Ok(row)
    }

    fn update(&mut self, resource: &Resource, id: i64, body: &Row) -> Result<Option<Row>, AppError> {
        let Some(mut row) = self
            .tables
            .get(&resource.table)
            .and_then(|t| t.rows.get(&id))
            .cloned()
        else {
            return Ok(None);
        };
        for f in resource.schema.input_fields() {
            if let Some(v) = body.get(&f.name) {
                row.insert(f.name.clone(), v.clone());
            }
        }
        row.insert(UPDATED_AT_FIELD.to_string(), now());
        self.check_unique(resource, &row, Some(id))?;
        self.check_foreign_keys(resource, &row)?;

        if let Some(table) = self.tables.get_mut(&resource.table) {
            table.rows.insert(id, row.clone());
        }
        Ok(Some(row))
    }

    fn upsert(&mut self, resource: &Resource, body: &Row) -> Result<(Row, bool), AppError> {
        let key = resource.upsert_key().ok_or_else(|| {
            AppError::Validation(format!("{} has no single unique field to upsert on", resource.name))
        })?;
        let existing = body.get(&key.name).filter(|v| !v.is_null()).and_then(|v| {
            self.tables.get(&resource.table).and_then(|t| {
                t.rows
                    .iter()
                    .find(|(_, r)| r.get(&key.name) == Some(v))
                    .map(|(id, _)| *id)
            })
        });
        match existing {
            Some(id) => {
                let row = self
                    .update(resource, id, body)?
                    .ok_or_else(|| AppError::NotFound(format!("{} {}", resource.name, id)))?;
                Ok((row, false))
            }
            None => Ok((self.insert(resource, body)?, true)),
        }
    }

    /// Run `apply` on every item; on the first error the table is restored as it was.
    fn all_or_nothing<T, I>(
        &mut self,
        resource: &Resource,
        items: I,
        mut apply: impl FnMut(&mut Self, I::Item) -> Result<T, AppError>,
    ) -> Result<Vec<T>, AppError>
    where
        I: IntoIterator,
    {
        let snapshot = self.tables.get(&resource.table).cloned();
        let mut out = Vec::new();
        for item in items {
            match apply(self, item) {
                Ok(v) => out.push(v),
                Err(e) => {
                    match snapshot {
                        Some(t) => self.tables.insert(resource.table.clone(), t),
                        None => self.tables.remove(&resource.table),
                    };
                    return Err(e);
                }
            }
        }
        Ok(out)
    }
}

/// Keeps every table in a map behind one lock; each operation holds the lock for its whole
/// duration, which gives the same all-or-nothing visibility as a database transaction.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn now() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339())
}

/// Evaluate the SQL default expressions models commonly use; anything else stores NULL.
fn eval_expression(expr: &str) -> Value {
    match expr.trim().to_ascii_lowercase().as_str() {
        "now()" | "current_timestamp" => now(),
        "current_date" => Value::String(chrono::Utc::now().format("%Y-%m-%d").to_string()),
        "gen_random_uuid()" => Value::String(uuid::Uuid::new_v4().to_string()),
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Null,
    }
}

/// NULLs sort after every value, as PostgreSQL does for ascending order.
fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn matches(row: &Row, filter: &Filter) -> bool {
    let v = row.get(&filter.field).unwrap_or(&Value::Null);
    if v.is_null() {
        return false;
    }
    if filter.op == FilterOp::Contains {
        return match (v.as_str(), filter.value.as_str()) {
            (Some(hay), Some(needle)) => hay.to_lowercase().contains(&needle.to_lowercase()),
            _ => false,
        };
    }
    let ord = compare(v, &filter.value);
    match filter.op {
        FilterOp::Eq => ord == Ordering::Equal,
        FilterOp::Gte => ord != Ordering::Less,
        FilterOp::Lte => ord != Ordering::Greater,
        FilterOp::Contains => false,
    }
}

fn matches_all(row: &Row, filters: &[Filter], join: Join) -> bool {
    match join {
        Join::And => filters.iter().all(|f| matches(row, f)),
        Join::Or => filters.is_empty() || filters.iter().any(|f| matches(row, f)),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn list(&self, resource: &Resource, params: &ListParams) -> Result<Page, AppError> {
        let inner = self.inner.read().await;
        let Some(table) = inner.tables.get(&resource.table) else {
            return Ok(Page::default());
        };
        let mut rows: Vec<&Row> = table
            .rows
            .values()
            .filter(|r| matches_all(r, &params.filters, params.join))
            .collect();
        let total = rows.len() as u64;
        let key = params.order_by.field.as_str();
        rows.sort_by(|a, b| {
            let av = a.get(key).unwrap_or(&Value::Null);
            let bv = b.get(key).unwrap_or(&Value::Null);
            let ord = if params.order_by.descending {
                compare(bv, av)
            } else {
                compare(av, bv)
            };
            ord.then_with(|| compare(&a[ID_FIELD], &b[ID_FIELD]))
        });
        let rows = rows
            .into_iter()
            .skip(usize::try_from(params.offset).unwrap_or(usize::MAX))
            .take(params.limit as usize)
            .cloned()
            .collect();
        Ok(Page { rows, total })
    }

    async fn count(&self, resource: &Resource, filters: &[Filter], join: Join) -> Result<u64, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.tables.get(&resource.table).map_or(0, |t| {
            t.rows.values().filter(|r| matches_all(r, filters, join)).count() as u64
        }))
    }

    async fn get(&self, resource: &Resource, id: i64) -> Result<Option<Row>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .tables
            .get(&resource.table)
            .and_then(|t| t.rows.get(&id))
            .cloned())
    }

    async fn create(&self, resource: &Resource, body: &Row) -> Result<Row, AppError> {
        let mut inner = self.inner.write().await;
        inner.learn_references(resource);
        inner.insert(resource, body)
    }

    async fn create_many(&self, resource: &Resource, bodies: &[Row]) -> Result<Vec<Row>, AppError> {
        let mut inner = self.inner.write().await;
        inner.learn_references(resource);
        inner.all_or_nothing(resource, bodies, |inner, body| inner.insert(resource, body))
    }

    async fn update(&self, resource: &Resource, id: i64, body: &Row) -> Result<Option<Row>, AppError> {
        let mut inner = self.inner.write().await;
        inner.learn_references(resource);
        inner.update(resource, id, body)
    }

    async fn update_many(&self, resource: &Resource, items: &[(i64, Row)]) -> Result<Vec<Row>, AppError> {
        let mut inner = self.inner.write().await;
        inner.learn_references(resource);
        inner.all_or_nothing(resource, items, |inner, (id, body)| {
            inner
                .update(resource, *id, body)?
                .ok_or_else(|| AppError::NotFound(format!("{} {}", resource.name, id)))
        })
    }

    async fn upsert(&self, resource: &Resource, body: &Row) -> Result<(Row, bool), AppError> {
        let mut inner = self.inner.write().await;
        inner.learn_references(resource);
        inner.upsert(resource, body)
    }

    async fn upsert_many(&self, resource: &Resource, bodies: &[Row]) -> Result<Vec<Row>, AppError> {
        let mut inner = self.inner.write().await;
        inner.learn_references(resource);
        inner.all_or_nothing(resource, bodies, |inner, body| {
            inner.upsert(resource, body).map(|(row, _)| row)
        })
    }

    async fn delete(&self, resource: &Resource, id: i64) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        let present = inner
            .tables
            .get(&resource.table)
            .map_or(false, |t| t.rows.contains_key(&id));
        if !present {
            return Ok(false);
        }
        inner.check_not_referenced(&resource.table, id)?;
        Ok(inner
            .tables
            .get_mut(&resource.table)
            .map_or(false, |t| t.rows.remove(&id).is_some()))
    }
}
