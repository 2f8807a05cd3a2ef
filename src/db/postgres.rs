//! sqlx Postgres implementation of the transport traits

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as SqlxRow, TypeInfo};

use super::{Database, Row, Transaction, Value};
use crate::error::{MigrateError, MigrateResult};

/// [`Database`] backed by a sqlx Postgres pool
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to a database URL
    pub async fn connect(database_url: &str) -> MigrateResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| MigrateError::Database(format!("failed to connect to database: {}", e)))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Value::Int(v) => query.bind(*v),
            Value::Bool(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Timestamp(v) => query.bind(*v),
            Value::Null => query.bind(Option::<i64>::None),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> MigrateResult<Row> {
    let mut columns = Vec::with_capacity(row.len());
    for (idx, col) in row.columns().iter().enumerate() {
        let value = match col.type_info().name() {
            "INT8" => row
                .try_get::<Option<i64>, _>(idx)
                .map(|v| v.map_or(Value::Null, Value::Int)),
            "INT4" => row
                .try_get::<Option<i32>, _>(idx)
                .map(|v| v.map_or(Value::Null, |n| Value::Int(n as i64))),
            "INT2" => row
                .try_get::<Option<i16>, _>(idx)
                .map(|v| v.map_or(Value::Null, |n| Value::Int(n as i64))),
            "BOOL" => row
                .try_get::<Option<bool>, _>(idx)
                .map(|v| v.map_or(Value::Null, Value::Bool)),
            "TIMESTAMP" => row.try_get::<Option<NaiveDateTime>, _>(idx).map(|v| {
                v.map_or(Value::Null, |n| {
                    Value::Timestamp(DateTime::from_naive_utc_and_offset(n, Utc))
                })
            }),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(idx)
                .map(|v| v.map_or(Value::Null, Value::Timestamp)),
            _ => row
                .try_get::<Option<String>, _>(idx)
                .map(|v| v.map_or(Value::Null, Value::Text)),
        }
        .map_err(|e| {
            MigrateError::Database(format!("failed to decode column {}: {}", col.name(), e))
        })?;
        columns.push(value);
    }
    Ok(Row::new(columns))
}

#[async_trait]
impl Database for PgDatabase {
    async fn execute(&self, sql: &str, params: &[Value]) -> MigrateResult<u64> {
        let query = bind_params(sqlx::query(sql), params);
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> MigrateResult<Vec<Row>> {
        let query = bind_params(sqlx::query(sql), params);
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::Database(e.to_string()))?;
        rows.iter().map(decode_row).collect()
    }

    async fn begin(&self) -> MigrateResult<Box<dyn Transaction>> {
        let tx = self.pool.begin().await.map_err(|e| {
            MigrateError::TransactionFailed(format!("failed to begin transaction: {}", e))
        })?;
        Ok(Box::new(PgTransaction { inner: Some(tx) }))
    }
}

/// [`Transaction`] over a sqlx Postgres transaction
pub struct PgTransaction {
    inner: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PgTransaction {
    fn inner_mut(&mut self) -> MigrateResult<&mut sqlx::Transaction<'static, Postgres>> {
        self.inner.as_mut().ok_or_else(|| {
            MigrateError::TransactionFailed("transaction already finished".to_string())
        })
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> MigrateResult<u64> {
        let tx = self.inner_mut()?;
        let query = bind_params(sqlx::query(sql), params);
        let result = query
            .execute(&mut **tx)
            .await
            .map_err(|e| MigrateError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn commit(mut self: Box<Self>) -> MigrateResult<()> {
        let tx = self.inner.take().ok_or_else(|| {
            MigrateError::TransactionFailed("transaction already finished".to_string())
        })?;
        tx.commit().await.map_err(|e| {
            MigrateError::TransactionFailed(format!("failed to commit transaction: {}", e))
        })
    }

    async fn rollback(mut self: Box<Self>) -> MigrateResult<()> {
        let tx = self.inner.take().ok_or_else(|| {
            MigrateError::TransactionFailed("transaction already finished".to_string())
        })?;
        tx.rollback().await.map_err(|e| {
            MigrateError::TransactionFailed(format!("failed to roll back transaction: {}", e))
        })
    }
}
