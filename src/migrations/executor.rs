//! Migration executor
//!
//! Runs one catalog entry's forward or reverse action and records the
//! matching ledger event as one atomic unit. In transactional mode the
//! step's statements and the ledger write commit together; in
//! no-transaction mode (for statements the engine cannot run inside a
//! transaction) the ledger write is a separate best-effort commit
//! immediately after the statements, and a crash between the two leaves
//! the step applied in schema but not recorded. That window is inherent to
//! the mode; the operator reconciles it manually.

use std::fs;

use tracing::{debug, info, warn};

use super::definitions::{Direction, Migration, MigrationKind, RunOutcome};
use super::ledger::{self, Ledger};
use super::parser;
use crate::config::MigrationConfig;
use crate::db::{Database, Transaction};
use crate::error::{MigrateError, MigrateResult};

/// Executes single migration steps against a database
pub struct Executor<'a> {
    db: &'a dyn Database,
    config: &'a MigrationConfig,
}

impl<'a> Executor<'a> {
    pub fn new(db: &'a dyn Database, config: &'a MigrationConfig) -> Self {
        Self { db, config }
    }

    /// Apply a step forward
    pub async fn up(&self, migration: &Migration) -> MigrateResult<RunOutcome> {
        self.run(migration, Direction::Up).await
    }

    /// Revert a step
    pub async fn down(&self, migration: &Migration) -> MigrateResult<RunOutcome> {
        self.run(migration, Direction::Down).await
    }

    /// Run one step in the given direction and record the ledger event
    pub async fn run(&self, migration: &Migration, direction: Direction) -> MigrateResult<RunOutcome> {
        let outcome = match migration.kind {
            MigrationKind::Script => self.run_script(migration, direction).await?,
            MigrationKind::Procedural => self.run_procedural(migration, direction).await?,
        };

        match outcome {
            RunOutcome::Ok => info!("OK    {}", migration.source_name()),
            RunOutcome::Empty => info!("EMPTY {}", migration.source_name()),
        }
        Ok(outcome)
    }

    async fn run_script(
        &self,
        migration: &Migration,
        direction: Direction,
    ) -> MigrateResult<RunOutcome> {
        let text =
            fs::read_to_string(&migration.source).map_err(|e| MigrateError::SourceUnavailable {
                name: migration.source_name().to_string(),
                cause: e.to_string(),
            })?;
        let parsed = parser::parse(migration.source_name(), &text, direction)?;

        if parsed.use_transaction {
            self.run_statements_in_tx(migration, direction, &parsed.statements)
                .await?;
        } else {
            self.run_statements_no_tx(migration, direction, &parsed.statements)
                .await?;
        }

        Ok(if parsed.statements.is_empty() {
            RunOutcome::Empty
        } else {
            RunOutcome::Ok
        })
    }

    async fn run_statements_in_tx(
        &self,
        migration: &Migration,
        direction: Direction,
        statements: &[String],
    ) -> MigrateResult<()> {
        debug!("begin transaction");
        let mut tx = self.db.begin().await?;

        for (index, statement) in statements.iter().enumerate() {
            debug!(statement = %statement, "executing statement");
            if let Err(e) = tx.execute(statement, &[]).await {
                rollback(tx).await;
                return Err(MigrateError::StatementExecutionFailed {
                    index,
                    statement: statement.clone(),
                    cause: e.to_string(),
                });
            }
        }

        let recorded = match direction {
            Direction::Up => {
                ledger::record_apply_in(
                    tx.as_mut(),
                    self.config,
                    &migration.service,
                    migration.version,
                )
                .await
            }
            Direction::Down => {
                ledger::record_revert_in(
                    tx.as_mut(),
                    self.config,
                    &migration.service,
                    migration.version,
                )
                .await
            }
        };
        if let Err(e) = recorded {
            rollback(tx).await;
            return Err(e);
        }

        debug!("commit transaction");
        tx.commit().await
    }

    async fn run_statements_no_tx(
        &self,
        migration: &Migration,
        direction: Direction,
        statements: &[String],
    ) -> MigrateResult<()> {
        for (index, statement) in statements.iter().enumerate() {
            debug!(statement = %statement, "executing statement");
            self.db.execute(statement, &[]).await.map_err(|e| {
                MigrateError::StatementExecutionFailed {
                    index,
                    statement: statement.clone(),
                    cause: e.to_string(),
                }
            })?;
        }

        let ledger = Ledger::new(self.db, self.config, &migration.service);
        match direction {
            Direction::Up => ledger.record_apply(migration.version).await,
            Direction::Down => ledger.record_revert(migration.version).await,
        }
    }

    async fn run_procedural(
        &self,
        migration: &Migration,
        direction: Direction,
    ) -> MigrateResult<RunOutcome> {
        if !migration.registered {
            return Err(MigrateError::UnregisteredProceduralStep(
                migration.source_name().to_string(),
            ));
        }

        debug!("begin transaction");
        let mut tx = self.db.begin().await?;

        let body = match direction {
            Direction::Up => migration.up_fn.as_ref(),
            Direction::Down => migration.down_fn.as_ref(),
        };

        if let Some(f) = body {
            if let Err(e) = f(tx.as_mut()).await {
                rollback(tx).await;
                return Err(e);
            }
        }

        let recorded = match direction {
            Direction::Up => {
                ledger::record_apply_in(
                    tx.as_mut(),
                    self.config,
                    &migration.service,
                    migration.version,
                )
                .await
            }
            Direction::Down => {
                ledger::record_revert_in(
                    tx.as_mut(),
                    self.config,
                    &migration.service,
                    migration.version,
                )
                .await
            }
        };
        if let Err(e) = recorded {
            rollback(tx).await;
            return Err(e);
        }

        debug!("commit transaction");
        tx.commit().await?;

        Ok(if body.is_some() {
            RunOutcome::Ok
        } else {
            RunOutcome::Empty
        })
    }
}

/// Roll back and keep the original failure as the surfaced error
async fn rollback(tx: Box<dyn Transaction>) {
    debug!("rollback transaction");
    if let Err(e) = tx.rollback().await {
        warn!("rollback failed: {}", e);
    }
}
