//! Version ledger
//!
//! Reads and writes the persisted table of apply/revert events and derives
//! the current schema version from it. The table is created lazily on
//! first access, seeded with a version-0 baseline row, and never dropped.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::definitions::{Direction, MigrationRecord};
use crate::config::MigrationConfig;
use crate::db::{Database, Transaction, Value};
use crate::error::{MigrateError, MigrateResult};

/// Ledger view for one service
pub struct Ledger<'a> {
    db: &'a dyn Database,
    config: &'a MigrationConfig,
    service: &'a str,
}

impl<'a> Ledger<'a> {
    pub fn new(db: &'a dyn Database, config: &'a MigrationConfig, service: &'a str) -> Self {
        Self {
            db,
            config,
            service,
        }
    }

    /// Current applied version for the service.
    ///
    /// Scans all surviving events most-recent-first, keeps the first row
    /// seen per version, and returns the highest version whose retained
    /// row records an apply. An absent ledger table reads as version 0 and
    /// triggers table creation so subsequent calls succeed.
    pub async fn current_version(&self) -> MigrateResult<i64> {
        let rows = match self.scan().await {
            Ok(rows) => rows,
            Err(_) => {
                self.create_table().await?;
                return Ok(0);
            }
        };

        let mut seen = HashSet::new();
        let mut current = 0i64;
        for row in &rows {
            let version = row.try_i64(0)?;
            let is_applied = row.try_bool(1)?;
            if seen.insert(version) && is_applied && version > current {
                current = version;
            }
        }
        Ok(current)
    }

    /// Make sure the ledger table exists
    pub async fn ensure_table(&self) -> MigrateResult<()> {
        self.current_version().await.map(|_| ())
    }

    /// Per-version applied flag, reduced to the most recent surviving
    /// event per version
    pub async fn status_snapshot(&self) -> MigrateResult<HashMap<i64, bool>> {
        let rows = match self.scan().await {
            Ok(rows) => rows,
            Err(_) => {
                self.create_table().await?;
                return Ok(HashMap::new());
            }
        };

        let mut statuses = HashMap::new();
        for row in &rows {
            let version = row.try_i64(0)?;
            let is_applied = row.try_bool(1)?;
            statuses.entry(version).or_insert(is_applied);
        }
        Ok(statuses)
    }

    /// Most recent event for one version, or `None` when the version has
    /// no surviving events (rendered as pending by the status report)
    pub async fn latest_event(&self, version: i64) -> MigrateResult<Option<MigrationRecord>> {
        let sql = self
            .config
            .dialect
            .latest_event_sql(&self.config.table_name, self.service);
        let rows = self.db.query(&sql, &[Value::Int(version)]).await?;
        match rows.first() {
            Some(row) => Ok(Some(MigrationRecord {
                version,
                tstamp: row.try_timestamp(0)?,
                is_applied: row.try_bool(1)?,
            })),
            None => Ok(None),
        }
    }

    /// Record an apply event outside a transaction (no-transaction mode;
    /// best-effort, committed separately from the step's own statements)
    pub async fn record_apply(&self, version: i64) -> MigrateResult<()> {
        let sql = self
            .config
            .dialect
            .insert_event_sql(&self.config.table_name, self.service);
        self.db
            .execute(&sql, &[Value::Int(version), Value::Bool(true)])
            .await
            .map_err(|e| self.write_failed(version, Direction::Up, e))?;
        Ok(())
    }

    /// Remove every event for a version outside a transaction.
    ///
    /// Reverting purges the version's history rather than appending a
    /// revert row, so a later re-apply produces a fresh single event.
    pub async fn record_revert(&self, version: i64) -> MigrateResult<()> {
        let sql = self
            .config
            .dialect
            .delete_events_sql(&self.config.table_name, self.service);
        self.db
            .execute(&sql, &[Value::Int(version)])
            .await
            .map_err(|e| self.write_failed(version, Direction::Down, e))?;
        Ok(())
    }

    fn write_failed(&self, version: i64, direction: Direction, cause: MigrateError) -> MigrateError {
        MigrateError::LedgerWriteFailed {
            service: self.service.to_string(),
            version,
            direction: direction.to_string(),
            cause: cause.to_string(),
        }
    }

    async fn scan(&self) -> MigrateResult<Vec<crate::db::Row>> {
        let sql = self
            .config
            .dialect
            .ledger_scan_sql(&self.config.table_name, self.service);
        self.db.query(&sql, &[]).await
    }

    async fn create_table(&self) -> MigrateResult<()> {
        debug!(
            table = %self.config.table_name,
            service = %self.service,
            "creating version ledger table"
        );
        let create = self.config.dialect.create_table_sql(&self.config.table_name);
        self.db.execute(&create, &[]).await?;

        // Baseline row so a pristine database reports version 0.
        let insert = self
            .config
            .dialect
            .insert_event_sql(&self.config.table_name, self.service);
        self.db
            .execute(&insert, &[Value::Int(0), Value::Bool(true)])
            .await
            .map_err(|e| self.write_failed(0, Direction::Up, e))?;
        Ok(())
    }
}

/// Record an apply event inside the step's own transaction
pub async fn record_apply_in(
    tx: &mut dyn Transaction,
    config: &MigrationConfig,
    service: &str,
    version: i64,
) -> MigrateResult<()> {
    let sql = config.dialect.insert_event_sql(&config.table_name, service);
    tx.execute(&sql, &[Value::Int(version), Value::Bool(true)])
        .await
        .map_err(|e| MigrateError::LedgerWriteFailed {
            service: service.to_string(),
            version,
            direction: Direction::Up.to_string(),
            cause: e.to_string(),
        })?;
    Ok(())
}

/// Delete every event for a version inside the step's own transaction
pub async fn record_revert_in(
    tx: &mut dyn Transaction,
    config: &MigrationConfig,
    service: &str,
    version: i64,
) -> MigrateResult<()> {
    let sql = config.dialect.delete_events_sql(&config.table_name, service);
    tx.execute(&sql, &[Value::Int(version)])
        .await
        .map_err(|e| MigrateError::LedgerWriteFailed {
            service: service.to_string(),
            version,
            direction: Direction::Down.to_string(),
            cause: e.to_string(),
        })?;
    Ok(())
}
