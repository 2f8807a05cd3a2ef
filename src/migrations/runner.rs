//! Migration runner - the orchestrator
//!
//! Composes the catalog, ledger and executor into the operator-facing
//! operations: advance one step, advance or retreat to a version, redo the
//! last step, reset everything, report status, report the current version.
//!
//! The engine holds no distributed lock: two processes migrating the same
//! service concurrently are only as safe as the database's own transaction
//! isolation makes them. Multi-step loops re-read the current version every
//! iteration, so a mid-loop failure or a concurrent external change leaves
//! a consistent, resumable state.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use super::catalog::Catalog;
use super::definitions::{RunOutcome, StatusEntry};
use super::executor::Executor;
use super::ledger::Ledger;
use super::registry::Registry;
use crate::config::MigrationConfig;
use crate::db::Database;
use crate::error::{MigrateError, MigrateResult};

/// Migration runner for one service against one database
pub struct MigrationRunner {
    db: Arc<dyn Database>,
    config: MigrationConfig,
    registry: Registry,
    service: String,
    dir: PathBuf,
}

impl MigrationRunner {
    /// Create a runner with an empty procedural registry
    pub fn new(
        db: Arc<dyn Database>,
        config: MigrationConfig,
        service: impl Into<String>,
        dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            db,
            config,
            registry: Registry::new(),
            service: service.into(),
            dir: dir.into(),
        }
    }

    /// Replace the procedural registry; call during startup, before any
    /// operation runs
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Mutable access to the registry for startup-time registration
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    fn ledger(&self) -> Ledger<'_> {
        Ledger::new(self.db.as_ref(), &self.config, &self.service)
    }

    fn executor(&self) -> Executor<'_> {
        Executor::new(self.db.as_ref(), &self.config)
    }

    fn catalog(&self) -> MigrateResult<Catalog> {
        Catalog::collect(&self.service, &self.dir, &self.registry)
    }

    /// Apply the next pending migration
    pub async fn up_by_one(&self) -> MigrateResult<RunOutcome> {
        let current_version = self.ledger().current_version().await?;
        let catalog = self.catalog()?;
        let next = catalog
            .next_after(current_version)
            .ok_or(MigrateError::NoNextVersion(current_version))?;
        self.executor().up(next).await
    }

    /// Apply every pending migration
    pub async fn up(&self) -> MigrateResult<()> {
        self.up_to(i64::MAX).await
    }

    /// Apply pending migrations up to and including `target`
    pub async fn up_to(&self, target: i64) -> MigrateResult<()> {
        let catalog = self.catalog()?;
        loop {
            let current_version = self.ledger().current_version().await?;
            match catalog.next_after(current_version) {
                Some(next) if next.version <= target => {
                    self.executor().up(next).await?;
                }
                _ => {
                    info!(
                        "no migrations to run. current version: {}",
                        current_version
                    );
                    return Ok(());
                }
            }
        }
    }

    /// Roll back the currently applied migration
    pub async fn down(&self) -> MigrateResult<RunOutcome> {
        let current_version = self.ledger().current_version().await?;
        let catalog = self.catalog()?;
        let current = catalog.current(current_version)?;
        self.executor().down(current).await
    }

    /// Roll back migrations until the current version is at or below
    /// `target`
    pub async fn down_to(&self, target: i64) -> MigrateResult<()> {
        let catalog = self.catalog()?;
        loop {
            let current_version = self.ledger().current_version().await?;
            let current = match catalog.current(current_version) {
                Ok(current) => current,
                Err(_) => {
                    info!(
                        "no migrations to run. current version: {}",
                        current_version
                    );
                    return Ok(());
                }
            };
            if current.version <= target {
                info!(
                    "no migrations to run. current version: {}",
                    current_version
                );
                return Ok(());
            }
            self.executor().down(current).await?;
        }
    }

    /// Roll back the most recently applied migration, then run it again.
    /// If either half fails the step stays in whatever state that half
    /// produced; nothing is retried.
    pub async fn redo(&self) -> MigrateResult<()> {
        let current_version = self.ledger().current_version().await?;
        let catalog = self.catalog()?;
        let current = catalog.current(current_version)?;
        self.executor().down(current).await?;
        self.executor().up(current).await?;
        Ok(())
    }

    /// Roll back every applied migration, highest version first.
    ///
    /// The status snapshot is read once; entries it does not mark applied
    /// are skipped.
    pub async fn reset(&self) -> MigrateResult<()> {
        let catalog = self.catalog()?;
        let statuses = self.ledger().status_snapshot().await?;

        for migration in catalog.migrations().iter().rev() {
            if !statuses.get(&migration.version).copied().unwrap_or(false) {
                continue;
            }
            self.executor().down(migration).await?;
        }
        Ok(())
    }

    /// Status of every catalog entry: latest apply timestamp or pending.
    /// Ensures the ledger table exists, so it is safe on a pristine
    /// database.
    pub async fn status(&self) -> MigrateResult<Vec<StatusEntry>> {
        let catalog = self.catalog()?;
        let ledger = self.ledger();
        ledger.ensure_table().await?;

        info!("    Applied At                  Migration");
        info!("    =======================================");

        let mut entries = Vec::with_capacity(catalog.len());
        for migration in catalog.migrations() {
            let record = ledger.latest_event(migration.version).await?;
            let applied_at = record.filter(|r| r.is_applied).map(|r| r.tstamp);
            let rendered = applied_at
                .map(|t| t.format("%a %b %e %H:%M:%S %Y").to_string())
                .unwrap_or_else(|| "Pending".to_string());
            info!("    {:<24} -- {}", rendered, migration.source_name());
            entries.push(StatusEntry {
                version: migration.version,
                source: migration.source_name().to_string(),
                applied_at,
            });
        }
        Ok(entries)
    }

    /// Current version of the database for this service
    pub async fn version(&self) -> MigrateResult<i64> {
        let current_version = self.ledger().current_version().await?;
        info!(
            "service {} version {}",
            self.service, current_version
        );
        Ok(current_version)
    }
}
