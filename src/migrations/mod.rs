//! Migration system
//!
//! Catalog collection, script parsing, the version ledger, single-step
//! execution and the orchestrating runner.

pub mod catalog;
pub mod definitions;
pub mod executor;
pub mod ledger;
pub mod parser;
pub mod registry;
pub mod runner;

pub use catalog::Catalog;
pub use definitions::{
    migration_fn, Direction, Migration, MigrationFn, MigrationKind, MigrationRecord, RunOutcome,
    StatusEntry,
};
pub use executor::Executor;
pub use ledger::Ledger;
pub use parser::{parse, ParsedScript, ANNOTATION_MARKER};
pub use registry::{ProceduralStep, Registry};
pub use runner::MigrationRunner;
