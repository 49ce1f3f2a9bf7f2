//! Builds parameterized INSERT, SELECT, UPDATE, DELETE for a generated resource.

use crate::generator::Resource;
use crate::model::{ID_FIELD, UPDATED_AT_FIELD};
use crate::schema::SchemaField;
use crate::service::{Filter, FilterOp, Join, ListParams};
use serde_json::{Map, Value};

/// Extra column on upsert results: true when the row was inserted. Not a valid model identifier.
pub const INSERTED_COLUMN: &str = "@inserted";

/// Quote identifier for PostgreSQL (safe: only from model definitions).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a parameter and return its placeholder with a cast to `pg_type`.
    fn push_param(&mut self, v: Value, pg_type: &str) -> String {
        // jsonb parses its text form, so scalars need their JSON encoding ("\"a\"", not "a").
        let v = match v {
            Value::String(_) if pg_type == "jsonb" => Value::String(v.to_string()),
            other => other,
        };
        self.params.push(v);
        format!("${}::{}", self.params.len(), pg_type)
    }
}

/// Cast for a filter value. Text compares as `text`, since `varchar(n)` casts truncate.
fn filter_type_of(resource: &Resource, column: &str) -> String {
    match resource.schema.field(column) {
        Some(f) if !f.field_type.is_text() => f.field_type.pg_type(),
        _ => "text".into(),
    }
}

/// `ILIKE` pattern matching `s` literally anywhere in the value.
fn contains_pattern(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

/// All columns in schema order; write-only columns are dropped later by the output projection.
fn select_column_list(resource: &Resource) -> String {
    resource
        .schema
        .fields
        .iter()
        .map(|f| quoted(&f.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn where_clause(q: &mut QueryBuf, resource: &Resource, filters: &[Filter], join: Join) -> String {
    let mut parts = Vec::with_capacity(filters.len());
    for f in filters {
        let (op, value) = match f.op {
            FilterOp::Eq => ("=", f.value.clone()),
            FilterOp::Gte => (">=", f.value.clone()),
            FilterOp::Lte => ("<=", f.value.clone()),
            FilterOp::Contains => {
                let needle = f.value.as_str().unwrap_or_default();
                ("ILIKE", Value::String(contains_pattern(needle)))
            }
        };
        let ph = q.push_param(value, &filter_type_of(resource, &f.field));
        parts.push(format!("{} {} {}", quoted(&f.field), op, ph));
    }
    let sep = match join {
        Join::And => " AND ",
        Join::Or => " OR ",
    };
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(sep))
    }
}

/// SELECT by primary key.
pub fn select_by_id(resource: &Resource, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_param(Value::from(id), "bigint");
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        select_column_list(resource),
        quoted(&resource.table),
        quoted(ID_FIELD),
        ph
    );
    q
}

/// SELECT page with filters, ORDER BY the requested column then id, LIMIT/OFFSET.
pub fn select_list(resource: &Resource, params: &ListParams) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, resource, &params.filters, params.join);
    let direction = if params.order_by.descending { "DESC" } else { "ASC" };
    let mut order = format!("{} {}", quoted(&params.order_by.field), direction);
    if params.order_by.field != ID_FIELD {
        order.push_str(&format!(", {} ASC", quoted(ID_FIELD)));
    }
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
        select_column_list(resource),
        quoted(&resource.table),
        where_sql,
        order,
        params.limit,
        params.offset
    );
    q
}

/// COUNT(*) over the same filters as [`select_list`].
pub fn count(resource: &Resource, filters: &[Filter], join: Join) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, resource, filters, join);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", quoted(&resource.table), where_sql);
    q
}

/// `INSERT INTO t (cols) VALUES (...)` for the provided input columns, without RETURNING.
fn insert_head(q: &mut QueryBuf, resource: &Resource, body: &Map<String, Value>) -> (String, Vec<String>) {
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for f in resource.schema.input_fields() {
        let Some(v) = body.get(&f.name) else { continue };
        placeholders.push(q.push_param(v.clone(), &f.field_type.pg_type()));
        cols.push(f.name.clone());
    }
    let table = quoted(&resource.table);
    let head = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", table)
    } else {
        let names: Vec<String> = cols.iter().map(|c| quoted(c)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            names.join(", "),
            placeholders.join(", ")
        )
    };
    (head, cols)
}

/// INSERT the validated payload. Omitted columns take their database default (or NULL).
pub fn insert(resource: &Resource, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let (head, _) = insert_head(&mut q, resource, body);
    q.sql = format!("{} RETURNING {}", head, select_column_list(resource));
    q
}

/// INSERT, or UPDATE the row holding the same `key` value: provided columns are overwritten,
/// the rest keep their stored values. Returns the row plus [`INSERTED_COLUMN`].
pub fn upsert(resource: &Resource, key: &SchemaField, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let (head, cols) = insert_head(&mut q, resource, body);
    let mut sets: Vec<String> = cols
        .iter()
        .filter(|c| **c != key.name)
        .map(|c| format!("{} = EXCLUDED.{}", quoted(c), quoted(c)))
        .collect();
    sets.push(format!("{} = NOW()", quoted(UPDATED_AT_FIELD)));
    q.sql = format!(
        "{} ON CONFLICT ({}) DO UPDATE SET {} RETURNING {}, (xmax = 0) AS {}",
        head,
        quoted(&key.name),
        sets.join(", "),
        select_column_list(resource),
        quoted(INSERTED_COLUMN)
    );
    q
}

/// UPDATE by id: SET the columns present in the payload and refresh updated_at.
pub fn update(resource: &Resource, id: i64, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for f in resource.schema.input_fields() {
        let Some(v) = body.get(&f.name) else { continue };
        let rhs = q.push_param(v.clone(), &f.field_type.pg_type());
        sets.push(format!("{} = {}", quoted(&f.name), rhs));
    }
    sets.push(format!("{} = NOW()", quoted(UPDATED_AT_FIELD)));
    let id_ph = q.push_param(Value::from(id), "bigint");
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        quoted(&resource.table),
        sets.join(", "),
        quoted(ID_FIELD),
        id_ph,
        select_column_list(resource)
    );
    q
}

/// DELETE by id, returning the id when a row was removed.
pub fn delete(resource: &Resource, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_param(Value::from(id), "bigint");
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        quoted(&resource.table),
        quoted(ID_FIELD),
        ph,
        quoted(ID_FIELD)
    );
    q
}
