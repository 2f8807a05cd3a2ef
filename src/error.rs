//! Error types for the migration engine
//!
//! Catalog-build and parse errors abort an operation before any database
//! mutation; execution-time errors roll back the in-flight transaction
//! before propagating. Nothing is retried automatically.

use thiserror::Error;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error types for migration operations
#[derive(Debug, Clone, Error)]
pub enum MigrateError {
    /// Migration file name does not follow `<version>_<description>.<ext>`
    #[error("invalid migration name '{name}': {reason}")]
    InvalidMigrationName { name: String, reason: String },

    /// Two migration sources declare the same version for one service
    #[error("duplicate migration version {version} for service '{service}'")]
    DuplicateVersion { service: String, version: i64 },

    /// No catalog entry with the requested version
    #[error("no migration with version {0}")]
    NoSuchVersion(i64),

    /// No catalog entry above the current version
    #[error("no next migration version after {0}")]
    NoNextVersion(i64),

    /// Unknown database engine name
    #[error("'{0}': unknown dialect")]
    UnsupportedDialect(String),

    /// Script annotations are missing, unknown, or unterminated
    #[error("malformed migration script '{name}': {reason}")]
    MalformedScript { name: String, reason: String },

    /// Script file could not be read
    #[error("failed to read migration source '{name}': {cause}")]
    SourceUnavailable { name: String, cause: String },

    /// A schema statement failed; carries the failing statement so the
    /// operator can assess partial state in no-transaction mode
    #[error("statement {index} failed ({statement}): {cause}")]
    StatementExecutionFailed {
        index: usize,
        statement: String,
        cause: String,
    },

    /// A procedural step was collected but never registered with a body
    #[error("procedural migration '{0}' was never registered; compiled steps must be linked into the binary and registered before the catalog is built")]
    UnregisteredProceduralStep(String),

    /// The schema changed but the ledger event could not be written;
    /// carries enough context for manual ledger repair
    #[error("failed to record ledger event for service '{service}' version {version} ({direction}): {cause}")]
    LedgerWriteFailed {
        service: String,
        version: i64,
        direction: String,
        cause: String,
    },

    /// Transaction begin/commit/rollback failure
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// Transport-level database error
    #[error("database error: {0}")]
    Database(String),
}
