//! In-memory stand-in for the database transport traits
//!
//! Recognizes the ledger SQL shapes the Postgres dialect produces for a
//! known table name and keeps ledger rows in memory; everything else is
//! treated as a schema statement and recorded for assertions. Transactions
//! stage against a snapshot and publish it on commit.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use waymark::db::{Database, Row, Transaction, Value};
use waymark::{MigrateError, MigrateResult};

#[derive(Clone)]
struct LedgerRow {
    id: i64,
    version: i64,
    service: String,
    is_applied: bool,
    tstamp: DateTime<Utc>,
}

#[derive(Clone, Default)]
struct State {
    table_exists: bool,
    next_id: i64,
    rows: Vec<LedgerRow>,
    statements: Vec<String>,
    fail_on: Option<String>,
}

/// In-memory [`Database`] double
#[derive(Clone)]
pub struct MemoryDb {
    table: String,
    state: Arc<Mutex<State>>,
}

impl MemoryDb {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Schema statements executed so far, in order
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    /// Surviving ledger rows as `(version, is_applied)`, insertion order
    pub fn ledger(&self) -> Vec<(i64, bool)> {
        self.state
            .lock()
            .unwrap()
            .rows
            .iter()
            .map(|r| (r.version, r.is_applied))
            .collect()
    }

    pub fn table_exists(&self) -> bool {
        self.state.lock().unwrap().table_exists
    }

    /// Fail any statement containing `needle`
    pub fn fail_on(&self, needle: &str) {
        self.state.lock().unwrap().fail_on = Some(needle.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().fail_on = None;
    }

    /// Push a ledger row directly, creating the table implicitly
    pub fn seed_event(&self, service: &str, version: i64, is_applied: bool) {
        let mut state = self.state.lock().unwrap();
        state.table_exists = true;
        push_row(&mut state, service, version, is_applied);
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn push_row(state: &mut State, service: &str, version: i64, is_applied: bool) {
    state.next_id += 1;
    let id = state.next_id;
    state.rows.push(LedgerRow {
        id,
        version,
        service: service.to_string(),
        is_applied,
        tstamp: base_time() + Duration::seconds(id),
    });
}

fn service_literal(sql: &str) -> String {
    sql.split('\'').nth(1).unwrap_or_default().to_string()
}

fn missing_table(table: &str) -> MigrateError {
    MigrateError::Database(format!("relation \"{}\" does not exist", table))
}

fn execute_in(state: &mut State, table: &str, sql: &str, params: &[Value]) -> MigrateResult<u64> {
    let sql = sql.trim();

    if sql.starts_with(&format!("CREATE TABLE IF NOT EXISTS {}", table)) {
        state.table_exists = true;
        return Ok(0);
    }

    if sql.starts_with(&format!("INSERT INTO {}", table)) {
        if !state.table_exists {
            return Err(missing_table(table));
        }
        let version = match params.first() {
            Some(Value::Int(v)) => *v,
            other => {
                return Err(MigrateError::Database(format!(
                    "unexpected version parameter: {:?}",
                    other
                )))
            }
        };
        let is_applied = matches!(params.get(1), Some(Value::Bool(true)));
        let service = service_literal(sql);
        push_row(state, &service, version, is_applied);
        return Ok(1);
    }

    if sql.starts_with(&format!("DELETE FROM {}", table)) {
        if !state.table_exists {
            return Err(missing_table(table));
        }
        let version = match params.first() {
            Some(Value::Int(v)) => *v,
            other => {
                return Err(MigrateError::Database(format!(
                    "unexpected version parameter: {:?}",
                    other
                )))
            }
        };
        let service = service_literal(sql);
        let before = state.rows.len();
        state
            .rows
            .retain(|r| !(r.version == version && r.service == service));
        return Ok((before - state.rows.len()) as u64);
    }

    // Anything else is a schema statement.
    if let Some(needle) = &state.fail_on {
        if sql.contains(needle.as_str()) {
            return Err(MigrateError::Database(format!(
                "injected failure for statement: {}",
                sql
            )));
        }
    }
    state.statements.push(sql.to_string());
    Ok(0)
}

fn query_in(state: &State, table: &str, sql: &str, params: &[Value]) -> MigrateResult<Vec<Row>> {
    let sql = sql.trim();

    if sql.starts_with("SELECT version_id, is_applied") && sql.contains(table) {
        if !state.table_exists {
            return Err(missing_table(table));
        }
        let service = service_literal(sql);
        let mut rows: Vec<&LedgerRow> = state
            .rows
            .iter()
            .filter(|r| r.service == service)
            .collect();
        rows.sort_by_key(|r| std::cmp::Reverse(r.id));
        return Ok(rows
            .into_iter()
            .map(|r| Row::new(vec![Value::Int(r.version), Value::Bool(r.is_applied)]))
            .collect());
    }

    if sql.starts_with("SELECT tstamp, is_applied") && sql.contains(table) {
        if !state.table_exists {
            return Err(missing_table(table));
        }
        let version = match params.first() {
            Some(Value::Int(v)) => *v,
            other => {
                return Err(MigrateError::Database(format!(
                    "unexpected version parameter: {:?}",
                    other
                )))
            }
        };
        let service = service_literal(sql);
        let latest = state
            .rows
            .iter()
            .filter(|r| r.service == service && r.version == version)
            .max_by_key(|r| r.tstamp);
        return Ok(latest
            .map(|r| vec![Row::new(vec![Value::Timestamp(r.tstamp), Value::Bool(r.is_applied)])])
            .unwrap_or_default());
    }

    Err(MigrateError::Database(format!(
        "unexpected query: {}",
        sql
    )))
}

#[async_trait]
impl Database for MemoryDb {
    async fn execute(&self, sql: &str, params: &[Value]) -> MigrateResult<u64> {
        let mut state = self.state.lock().unwrap();
        execute_in(&mut state, &self.table, sql, params)
    }

    async fn query(&self, sql: &str, params: &[Value]) -> MigrateResult<Vec<Row>> {
        let state = self.state.lock().unwrap();
        query_in(&state, &self.table, sql, params)
    }

    async fn begin(&self) -> MigrateResult<Box<dyn Transaction>> {
        let staged = self.state.lock().unwrap().clone();
        Ok(Box::new(MemoryTransaction {
            table: self.table.clone(),
            shared: Arc::clone(&self.state),
            staged,
        }))
    }
}

/// Snapshot-staging [`Transaction`] over [`MemoryDb`]
pub struct MemoryTransaction {
    table: String,
    shared: Arc<Mutex<State>>,
    staged: State,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> MigrateResult<u64> {
        execute_in(&mut self.staged, &self.table, sql, params)
    }

    async fn commit(self: Box<Self>) -> MigrateResult<()> {
        *self.shared.lock().unwrap() = self.staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> MigrateResult<()> {
        Ok(())
    }
}
