//! Table bootstrap: `CREATE TABLE IF NOT EXISTS` for every registered model, in foreign-key
//! dependency order. Existing tables are left untouched; schema changes go through external
//! migrations.

use crate::error::AppError;
use crate::generator::Resource;
use crate::model::{FieldDefault, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
use crate::registry::Registry;
use crate::schema::SchemaField;
use crate::sql::quoted;
use serde_json::Value;
use sqlx::PgPool;

fn literal(v: &Value) -> String {
    match v {
        Value::Null => "NULL".into(),
        Value::Bool(b) => if *b { "TRUE".into() } else { "FALSE".into() },
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

fn column_sql(f: &SchemaField) -> String {
    match f.name.as_str() {
        ID_FIELD => return format!("{} BIGSERIAL PRIMARY KEY", quoted(ID_FIELD)),
        CREATED_AT_FIELD | UPDATED_AT_FIELD => {
            return format!("{} TIMESTAMPTZ NOT NULL DEFAULT NOW()", quoted(&f.name))
        }
        _ => {}
    }
    let mut def = format!("{} {}", quoted(&f.name), f.field_type.pg_type().to_uppercase());
    if !f.nullable {
        def.push_str(" NOT NULL");
    }
    if f.unique {
        def.push_str(" UNIQUE");
    }
    match &f.default {
        Some(FieldDefault::Value(v)) => {
            def.push_str(" DEFAULT ");
            def.push_str(&literal(v));
        }
        Some(FieldDefault::Expression(e)) => {
            def.push_str(" DEFAULT ");
            def.push_str(e);
        }
        None => {}
    }
    if let Some(table) = &f.references_table {
        def.push_str(&format!(" REFERENCES {} ({})", quoted(table), quoted(ID_FIELD)));
    }
    def
}

/// DDL for one resource's table.
pub fn create_table_sql(resource: &Resource) -> String {
    let cols: Vec<String> = resource.schema.fields.iter().map(column_sql).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quoted(&resource.table),
        cols.join(",\n  ")
    )
}

/// Create every missing table. The registry is already in dependency order, so referenced
/// tables exist before the tables that point at them.
pub async fn ensure_tables(pool: &PgPool, registry: &Registry) -> Result<(), AppError> {
    for resource in registry.resources() {
        let sql = create_table_sql(resource);
        tracing::debug!(table = %resource.table, %sql, "ensure table");
        sqlx::query(&sql).execute(pool).await?;
    }
    tracing::info!(tables = registry.len(), "tables ensured");
    Ok(())
}
