//! # waymark: service-scoped SQL schema migration engine
//!
//! Tracks, in the target database itself, which of an ordered set of
//! migration steps have been applied for a logical tenant ("service"), and
//! applies or reverts steps to move the database to a desired version,
//! across multiple SQL dialects.
//!
//! Migration steps come from two sources: annotated SQL script files
//! (`-- +waymark Up` / `-- +waymark Down` directives) and compiled
//! procedural steps registered by the embedding program at startup. A
//! per-dialect SQL template layer keeps the rest of the engine
//! dialect-agnostic, and a persisted ledger of apply/revert events is the
//! source of truth for the current version.

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod migrations;

pub use config::MigrationConfig;
pub use db::{Database, PgDatabase, Row, Transaction, Value};
pub use dialect::Dialect;
pub use error::{MigrateError, MigrateResult};
pub use migrations::{
    migration_fn, Catalog, Direction, Executor, Ledger, Migration, MigrationFn, MigrationKind,
    MigrationRecord, MigrationRunner, Registry, RunOutcome, StatusEntry,
};
