//! Core types for the migration system
//!
//! Defines the fundamental types used throughout the engine: the catalog
//! entry [`Migration`], the ledger row [`MigrationRecord`], execution
//! direction and outcome, and the status report row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use crate::db::Transaction;
use crate::error::MigrateResult;

/// Callable body of a procedural migration step, invoked with the open
/// transaction handle
pub type MigrationFn = Arc<
    dyn for<'a> Fn(
            &'a mut dyn Transaction,
        ) -> Pin<Box<dyn Future<Output = MigrateResult<()>> + Send + 'a>>
        + Send
        + Sync,
>;

/// Wrap a boxed-future callable into a [`MigrationFn`]
pub fn migration_fn<F>(f: F) -> MigrationFn
where
    F: for<'a> Fn(
            &'a mut dyn Transaction,
        ) -> Pin<Box<dyn Future<Output = MigrateResult<()>> + Send + 'a>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// How a migration step's actions are expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationKind {
    /// Annotated SQL script file, parsed lazily at execution time
    Script,
    /// Compiled step registered by the embedding program
    Procedural,
}

/// Direction of one migration execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn is_up(&self) -> bool {
        matches!(self, Direction::Up)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Observational qualifier of a successful execution; never affects ledger
/// state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// At least one statement or a callable body ran
    Ok,
    /// The direction had no statements / no callable body
    Empty,
}

/// One schema change unit in the catalog
#[derive(Clone)]
pub struct Migration {
    /// Tenant namespace scoping ledger rows and ordering
    pub service: String,
    /// Positive version, unique within the catalog
    pub version: i64,
    /// Next version in the sorted catalog, if any
    pub next: Option<i64>,
    /// Previous version in the sorted catalog, if any
    pub previous: Option<i64>,
    /// Script path, or the registration name for procedural steps
    pub source: String,
    pub kind: MigrationKind,
    /// Whether a procedural step was linked to a registration
    pub registered: bool,
    pub up_fn: Option<MigrationFn>,
    pub down_fn: Option<MigrationFn>,
}

impl Migration {
    /// Base name of the source, used in log lines and status output
    pub fn source_name(&self) -> &str {
        Path::new(&self.source)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.source)
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("service", &self.service)
            .field("version", &self.version)
            .field("next", &self.next)
            .field("previous", &self.previous)
            .field("source", &self.source)
            .field("kind", &self.kind)
            .field("registered", &self.registered)
            .field("up_fn", &self.up_fn.as_ref().map(|_| "fn"))
            .field("down_fn", &self.down_fn.as_ref().map(|_| "fn"))
            .finish()
    }
}

/// One ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: i64,
    pub tstamp: DateTime<Utc>,
    /// true for an apply event, false for a revert event
    pub is_applied: bool,
}

/// One row of the status report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub version: i64,
    pub source: String,
    /// Timestamp of the latest apply event, or `None` when pending
    pub applied_at: Option<DateTime<Utc>>,
}
