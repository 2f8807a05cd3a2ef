//! Database transport seam
//!
//! The engine talks to the target database exclusively through the
//! [`Database`] and [`Transaction`] traits: execute a parameterized
//! statement, run a parameterized query, begin/commit/rollback. A sqlx
//! Postgres implementation ships in [`postgres`]; tests use an in-memory
//! double of the same traits.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{MigrateError, MigrateResult};

pub use postgres::PgDatabase;

/// A value bound to a statement placeholder or read from a result column
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Text(String),
    Timestamp(DateTime<Utc>),
    Null,
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

/// One result row with typed column accessors
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<Value>) -> Self {
        Self { columns }
    }

    fn column(&self, idx: usize) -> MigrateResult<&Value> {
        self.columns
            .get(idx)
            .ok_or_else(|| MigrateError::Database(format!("no column at index {}", idx)))
    }

    pub fn try_i64(&self, idx: usize) -> MigrateResult<i64> {
        match self.column(idx)? {
            Value::Int(v) => Ok(*v),
            other => Err(MigrateError::Database(format!(
                "column {} is not an integer: {:?}",
                idx, other
            ))),
        }
    }

    /// Booleans; integer columns coerce (sqlite and clickhouse store 0/1)
    pub fn try_bool(&self, idx: usize) -> MigrateResult<bool> {
        match self.column(idx)? {
            Value::Bool(v) => Ok(*v),
            Value::Int(v) => Ok(*v != 0),
            other => Err(MigrateError::Database(format!(
                "column {} is not a boolean: {:?}",
                idx, other
            ))),
        }
    }

    pub fn try_timestamp(&self, idx: usize) -> MigrateResult<DateTime<Utc>> {
        match self.column(idx)? {
            Value::Timestamp(v) => Ok(*v),
            other => Err(MigrateError::Database(format!(
                "column {} is not a timestamp: {:?}",
                idx, other
            ))),
        }
    }
}

/// An open database transaction
///
/// `commit` and `rollback` consume the transaction; implementations report
/// begin/commit/rollback failures as [`MigrateError::TransactionFailed`].
#[async_trait]
pub trait Transaction: Send {
    /// Execute a statement with positional parameters, returning the
    /// affected-row count
    async fn execute(&mut self, sql: &str, params: &[Value]) -> MigrateResult<u64>;

    async fn commit(self: Box<Self>) -> MigrateResult<()>;

    async fn rollback(self: Box<Self>) -> MigrateResult<()>;
}

/// A database connection or pool the engine can run statements against
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute a statement outside any transaction
    async fn execute(&self, sql: &str, params: &[Value]) -> MigrateResult<u64>;

    /// Run a query and materialize the result rows
    async fn query(&self, sql: &str, params: &[Value]) -> MigrateResult<Vec<Row>>;

    /// Begin a transaction
    async fn begin(&self) -> MigrateResult<Box<dyn Transaction>>;
}
