//! PostgreSQL store: executes the SQL builder's statements through a sqlx pool.

use crate::error::AppError;
use crate::generator::Resource;
use crate::model::FieldType;
use crate::schema::SchemaField;
use crate::service::{Filter, Join, ListParams};
use crate::sql::{self, text_param, QueryBuf, INSERTED_COLUMN};
use crate::store::{Page, Row, Store};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgRow};
use sqlx::query::{Query, QueryScalar};
use sqlx::{ConnectOptions, PgConnection, PgPool, Postgres};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bound(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(text_param(p));
    }
    query
}

fn bound_scalar(q: &QueryBuf) -> QueryScalar<'_, Postgres, i64, PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query_scalar::<Postgres, i64>(&q.sql);
    for p in &q.params {
        query = query.bind(text_param(p));
    }
    query
}

fn upsert_key(resource: &Resource) -> Result<&SchemaField, AppError> {
    resource
        .upsert_key()
        .ok_or_else(|| AppError::Validation(format!("{} has no single unique field to upsert on", resource.name)))
}

async fn upsert_in(
    conn: &mut PgConnection,
    resource: &Resource,
    key: &SchemaField,
    body: &Row,
) -> Result<(Row, bool), AppError> {
    use sqlx::Row as _;
    let q = sql::upsert(resource, key, body);
    let row = bound(&q).fetch_one(&mut *conn).await?;
    let inserted: bool = row.try_get(INSERTED_COLUMN).map_err(AppError::Db)?;
    Ok((decode_row(resource, &row)?, inserted))
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list(&self, resource: &Resource, params: &ListParams) -> Result<Page, AppError> {
        let count_q = sql::count(resource, &params.filters, params.join);
        let page_q = sql::select_list(resource, params);

        let mut tx = self.pool.begin().await?;
        let total = bound_scalar(&count_q).fetch_one(&mut *tx).await?;
        let rows = bound(&page_q).fetch_all(&mut *tx).await?;
        tx.commit().await?;

        let rows = rows
            .iter()
            .map(|r| decode_row(resource, r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            rows,
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn count(&self, resource: &Resource, filters: &[Filter], join: Join) -> Result<u64, AppError> {
        let q = sql::count(resource, filters, join);
        let total = bound_scalar(&q).fetch_one(&self.pool).await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn get(&self, resource: &Resource, id: i64) -> Result<Option<Row>, AppError> {
        let q = sql::select_by_id(resource, id);
        let row = bound(&q).fetch_optional(&self.pool).await?;
        row.map(|r| decode_row(resource, &r)).transpose()
    }

    async fn create(&self, resource: &Resource, body: &Row) -> Result<Row, AppError> {
        let q = sql::insert(resource, body);
        let mut tx = self.pool.begin().await?;
        let row = bound(&q).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        decode_row(resource, &row)
    }

    async fn create_many(&self, resource: &Resource, bodies: &[Row]) -> Result<Vec<Row>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut rows = Vec::with_capacity(bodies.len());
        for body in bodies {
            let q = sql::insert(resource, body);
            rows.push(bound(&q).fetch_one(&mut *tx).await?);
        }
        tx.commit().await?;
        rows.iter().map(|r| decode_row(resource, r)).collect()
    }

    async fn update(&self, resource: &Resource, id: i64, body: &Row) -> Result<Option<Row>, AppError> {
        let q = sql::update(resource, id, body);
        let mut tx = self.pool.begin().await?;
        let row = bound(&q).fetch_optional(&mut *tx).await?;
        tx.commit().await?;
        row.map(|r| decode_row(resource, &r)).transpose()
    }

    async fn update_many(&self, resource: &Resource, items: &[(i64, Row)]) -> Result<Vec<Row>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut rows = Vec::with_capacity(items.len());
        for (id, body) in items {
            let q = sql::update(resource, *id, body);
            match bound(&q).fetch_optional(&mut *tx).await? {
                Some(row) => rows.push(row),
                // Dropping the transaction rolls back the rows already updated.
                None => return Err(AppError::NotFound(format!("{} {}", resource.name, id))),
            }
        }
        tx.commit().await?;
        rows.iter().map(|r| decode_row(resource, r)).collect()
    }

    async fn upsert(&self, resource: &Resource, body: &Row) -> Result<(Row, bool), AppError> {
        let key = upsert_key(resource)?;
        let mut tx = self.pool.begin().await?;
        let result = upsert_in(&mut *tx, resource, key, body).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn upsert_many(&self, resource: &Resource, bodies: &[Row]) -> Result<Vec<Row>, AppError> {
        let key = upsert_key(resource)?;
        let mut tx = self.pool.begin().await?;
        let mut rows = Vec::with_capacity(bodies.len());
        for body in bodies {
            rows.push(upsert_in(&mut *tx, resource, key, body).await?.0);
        }
        tx.commit().await?;
        Ok(rows)
    }

    async fn delete(&self, resource: &Resource, id: i64) -> Result<bool, AppError> {
        let q = sql::delete(resource, id);
        let mut tx = self.pool.begin().await?;
        let row = bound(&q).fetch_optional(&mut *tx).await?;
        tx.commit().await?;
        Ok(row.is_some())
    }
}

fn decode_row(resource: &Resource, row: &PgRow) -> Result<Row, AppError> {
    let mut map = Row::new();
    for f in &resource.schema.fields {
        let v = decode_cell(row, f).map_err(AppError::Db)?;
        map.insert(f.name.clone(), v);
    }
    Ok(map)
}

/// Decode one column by its declared type.
fn decode_cell(row: &PgRow, f: &SchemaField) -> Result<Value, sqlx::Error> {
    use sqlx::Row as _;
    let name = f.name.as_str();
    let v = match &f.field_type {
        FieldType::Text { .. } => row.try_get::<Option<String>, _>(name)?.map(Value::String),
        FieldType::Integer => row.try_get::<Option<i32>, _>(name)?.map(Value::from),
        FieldType::BigInt | FieldType::ForeignKey { .. } => row.try_get::<Option<i64>, _>(name)?.map(Value::from),
        FieldType::Float => row.try_get::<Option<f64>, _>(name)?.map(Value::from),
        FieldType::Boolean => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool),
        FieldType::Timestamp => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)?
            .map(|d| Value::String(d.to_rfc3339())),
        FieldType::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(name)?
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        FieldType::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(name)?
            .map(|u| Value::String(u.to_string())),
        FieldType::Json => row.try_get::<Option<Value>, _>(name)?,
    };
    Ok(v.unwrap_or(Value::Null))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Create `database` if it does not exist, connecting through the `postgres` maintenance database.
pub async fn ensure_database_exists(options: &PgConnectOptions, database: &str) -> Result<(), AppError> {
    if database.is_empty() || database == "postgres" {
        return Ok(());
    }
    let mut conn = options.clone().database("postgres").connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(database)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(database)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}
