//! PostgreSQL storage over a sqlx pool. Each session is one database transaction; dropping
//! an unfinished session rolls it back.

use crate::config::{ColumnInfo, ColumnType, EntityDescriptor};
use crate::error::AppError;
use crate::sql::{self, BindValue, QueryBuf};
use crate::storage::{Filter, Row, Session, Storage};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn begin(&self) -> Result<Box<dyn Session>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx }))
    }
}

pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

fn bound(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
    q.params
        .iter()
        .fold(sqlx::query(&q.sql), |query, p| query.bind(BindValue::from(p)))
}

#[async_trait]
impl Session for PgSession {
    async fn insert(&mut self, entity: &EntityDescriptor, row: &Row) -> Result<Value, AppError> {
        let q = sql::insert(entity, row);
        let record = bound(&q).fetch_one(&mut *self.tx).await?;
        Ok(entity
            .identity_column()
            .map(|c| cell_to_value(&record, c))
            .unwrap_or(Value::Null))
    }

    async fn update(&mut self, entity: &EntityDescriptor, filter: &Filter, values: &Row) -> Result<u64, AppError> {
        if values.is_empty() {
            return Ok(0);
        }
        let q = sql::update_where(entity, filter, values);
        let done = bound(&q).execute(&mut *self.tx).await?;
        Ok(done.rows_affected())
    }

    async fn query(&mut self, entity: &EntityDescriptor, filter: &Filter) -> Result<Vec<Row>, AppError> {
        let q = sql::select_where(entity, filter);
        let records = bound(&q).fetch_all(&mut *self.tx).await?;
        Ok(records.iter().map(|r| row_to_json(entity, r)).collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn row_to_json(entity: &EntityDescriptor, record: &PgRow) -> Row {
    entity
        .columns
        .iter()
        .map(|c| (c.name.clone(), cell_to_value(record, c)))
        .collect()
}

/// Decode one cell by its declared column type. Undecodable cells become null.
fn cell_to_value(record: &PgRow, column: &ColumnInfo) -> Value {
    use sqlx::Row as _;
    let name = column.name.as_str();
    let decoded: Result<Value, sqlx::Error> = match column.data_type {
        ColumnType::Integer => record
            .try_get::<Option<i32>, _>(name)
            .map(|v| v.map(Value::from))
            .or_else(|_| record.try_get::<Option<i64>, _>(name).map(|v| v.map(Value::from)))
            .map(Option::unwrap_or_default),
        ColumnType::BigInt => record
            .try_get::<Option<i64>, _>(name)
            .map(|v| v.map(Value::from).unwrap_or_default()),
        ColumnType::Float => record.try_get::<Option<f64>, _>(name).map(|v| {
            v.and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_default()
        }),
        ColumnType::Boolean => record
            .try_get::<Option<bool>, _>(name)
            .map(|v| v.map(Value::Bool).unwrap_or_default()),
        ColumnType::Uuid => record
            .try_get::<Option<uuid::Uuid>, _>(name)
            .map(|v| v.map(|u| Value::String(u.to_string())).unwrap_or_default()),
        ColumnType::TimestampTz => record
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
            .map(|v| v.map(|d| Value::String(d.to_rfc3339())).unwrap_or_default()),
        ColumnType::Timestamp => record
            .try_get::<Option<chrono::NaiveDateTime>, _>(name)
            .map(|v| {
                v.map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
                    .unwrap_or_default()
            }),
        ColumnType::Date => record
            .try_get::<Option<chrono::NaiveDate>, _>(name)
            .map(|v| v.map(|d| Value::String(d.format("%Y-%m-%d").to_string())).unwrap_or_default()),
        ColumnType::Json => record
            .try_get::<Option<Value>, _>(name)
            .map(Option::unwrap_or_default),
        ColumnType::Numeric | ColumnType::Text => record
            .try_get::<Option<String>, _>(name)
            .map(|v| v.map(Value::String).unwrap_or_default()),
    };
    decoded.unwrap_or_else(|e| {
        tracing::warn!(column = name, error = %e, "undecodable column");
        Value::Null
    })
}
