//! Configuration for the migration engine
//!
//! The dialect and ledger table name are explicit values threaded into the
//! catalog, ledger, executor and runner. Set them once before any operation
//! runs; they are not safe to change underneath an in-flight operation.

use crate::dialect::Dialect;
use crate::error::MigrateResult;

/// Configuration for the migration system
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// SQL dialect of the target database engine
    pub dialect: Dialect,
    /// Name of the ledger table tracking applied versions
    pub table_name: String,
}

impl MigrationConfig {
    /// Create a configuration for the given dialect with the default table name
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            table_name: default_table_name().to_string(),
        }
    }

    /// Create a configuration from an engine name such as `"postgres"`
    pub fn for_engine(name: &str) -> MigrateResult<Self> {
        Ok(Self::new(Dialect::from_name(name)?))
    }

    /// Override the ledger table name
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self::new(Dialect::Postgres)
    }
}

/// Default name of the ledger table
pub fn default_table_name() -> &'static str {
    "waymark_db_version"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_postgres_and_default_table() {
        let config = MigrationConfig::default();
        assert_eq!(config.dialect, Dialect::Postgres);
        assert_eq!(config.table_name, "waymark_db_version");
    }

    #[test]
    fn table_name_override_is_picked_up_by_templates() {
        let config = MigrationConfig::default().with_table_name("custom_versions");
        let sql = config
            .dialect
            .insert_event_sql(&config.table_name, "billing");
        assert!(sql.contains("custom_versions"));
    }

    #[test]
    fn for_engine_rejects_unknown_names() {
        assert!(MigrationConfig::for_engine("oracle").is_err());
    }
}
