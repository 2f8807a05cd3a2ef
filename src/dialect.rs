//! Dialect adapter - per-engine SQL for the version ledger
//!
//! Every engine-specific piece of SQL the engine needs lives here: ledger
//! table DDL, event insert/delete, the latest-event lookup and the full
//! ledger scan. The template methods are total; they only format strings.
//! Execution failures surface from the transport layer, not here.
//!
//! Placeholder syntax for bound parameters (`$1`, `?`, `@p1`) is a dialect
//! concern so the rest of the engine never special-cases it. The table name
//! is interpolated at call time, so a configuration change takes effect
//! immediately.

use crate::error::{MigrateError, MigrateResult};
use serde::{Deserialize, Serialize};

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite3,
    SqlServer,
    Redshift,
    TiDb,
    ClickHouse,
}

impl Dialect {
    /// Select a dialect by engine name
    pub fn from_name(name: &str) -> MigrateResult<Self> {
        match name {
            "postgres" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            "sqlite3" => Ok(Dialect::Sqlite3),
            "mssql" => Ok(Dialect::SqlServer),
            "redshift" => Ok(Dialect::Redshift),
            "tidb" => Ok(Dialect::TiDb),
            "clickhouse" => Ok(Dialect::ClickHouse),
            other => Err(MigrateError::UnsupportedDialect(other.to_string())),
        }
    }

    /// Engine name as accepted by [`Dialect::from_name`]
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Sqlite3 => "sqlite3",
            Dialect::SqlServer => "mssql",
            Dialect::Redshift => "redshift",
            Dialect::TiDb => "tidb",
            Dialect::ClickHouse => "clickhouse",
        }
    }

    /// Positional placeholder for the nth bound parameter (1-based)
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres | Dialect::Redshift => format!("${}", n),
            Dialect::SqlServer => format!("@p{}", n),
            Dialect::MySql | Dialect::Sqlite3 | Dialect::TiDb | Dialect::ClickHouse => {
                "?".to_string()
            }
        }
    }

    /// DDL creating the ledger table if it does not exist
    pub fn create_table_sql(&self, table: &str) -> String {
        match self {
            Dialect::Postgres => format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                    id serial NOT NULL,\n    \
                    version_id bigint NOT NULL,\n    \
                    service varchar(100) NOT NULL,\n    \
                    is_applied boolean NOT NULL,\n    \
                    tstamp timestamp NULL default now(),\n    \
                    PRIMARY KEY(id)\n\
                );",
                table
            ),
            Dialect::MySql => format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                    id serial NOT NULL,\n    \
                    version_id bigint NOT NULL,\n    \
                    service varchar(100) NOT NULL,\n    \
                    is_applied boolean NOT NULL,\n    \
                    tstamp timestamp NULL default now(),\n    \
                    PRIMARY KEY(id)\n\
                );",
                table
            ),
            Dialect::Sqlite3 => format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                    id INTEGER PRIMARY KEY AUTOINCREMENT,\n    \
                    version_id INTEGER NOT NULL,\n    \
                    service VARCHAR(100) NOT NULL,\n    \
                    is_applied INTEGER NOT NULL,\n    \
                    tstamp TIMESTAMP DEFAULT (datetime('now'))\n\
                );",
                table
            ),
            Dialect::SqlServer => format!(
                "IF OBJECT_ID('{0}', 'U') IS NULL\n\
                 CREATE TABLE {0} (\n    \
                    id INT NOT NULL IDENTITY(1,1) PRIMARY KEY,\n    \
                    version_id BIGINT NOT NULL,\n    \
                    service VARCHAR(100) NOT NULL,\n    \
                    is_applied BIT NOT NULL,\n    \
                    tstamp DATETIME NULL DEFAULT CURRENT_TIMESTAMP\n\
                 );",
                table
            ),
            Dialect::Redshift => format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                    id integer NOT NULL identity(1, 1),\n    \
                    version_id bigint NOT NULL,\n    \
                    service varchar(100) NOT NULL,\n    \
                    is_applied boolean NOT NULL,\n    \
                    tstamp timestamp NULL default sysdate,\n    \
                    PRIMARY KEY(id)\n\
                );",
                table
            ),
            Dialect::TiDb => format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT UNIQUE,\n    \
                    version_id bigint NOT NULL,\n    \
                    service varchar(100) NOT NULL,\n    \
                    is_applied boolean NOT NULL,\n    \
                    tstamp timestamp NULL default now(),\n    \
                    PRIMARY KEY(id)\n\
                );",
                table
            ),
            Dialect::ClickHouse => format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                    version_id Int64,\n    \
                    service String,\n    \
                    is_applied UInt8,\n    \
                    date Date default now(),\n    \
                    tstamp DateTime default now()\n\
                ) ENGINE = MergeTree(date, (date), 8192);",
                table
            ),
        }
    }

    /// Insert one ledger event; binds `(version, is_applied)`
    pub fn insert_event_sql(&self, table: &str, service: &str) -> String {
        format!(
            "INSERT INTO {} (version_id, is_applied, service) VALUES ({}, {}, '{}');",
            table,
            self.placeholder(1),
            self.placeholder(2),
            service
        )
    }

    /// Delete every ledger event for one version; binds `(version,)`
    pub fn delete_events_sql(&self, table: &str, service: &str) -> String {
        match self {
            // MergeTree has no DELETE; mutations go through ALTER TABLE.
            Dialect::ClickHouse => format!(
                "ALTER TABLE {} DELETE WHERE version_id = {} AND service = '{}';",
                table,
                self.placeholder(1),
                service
            ),
            _ => format!(
                "DELETE FROM {} WHERE version_id={} AND service='{}';",
                table,
                self.placeholder(1),
                service
            ),
        }
    }

    /// Most recent event for one version, by timestamp; binds `(version,)`
    pub fn latest_event_sql(&self, table: &str, service: &str) -> String {
        match self {
            Dialect::SqlServer => format!(
                "SELECT TOP 1 tstamp, is_applied FROM {} WHERE version_id={} AND service='{}' ORDER BY tstamp DESC;",
                table,
                self.placeholder(1),
                service
            ),
            _ => format!(
                "SELECT tstamp, is_applied FROM {} WHERE version_id={} AND service='{}' ORDER BY tstamp DESC LIMIT 1;",
                table,
                self.placeholder(1),
                service
            ),
        }
    }

    /// Full ledger scan for one service, most recent insertion first
    pub fn ledger_scan_sql(&self, table: &str, service: &str) -> String {
        match self {
            // No autoincrement id on the ClickHouse schema; tstamp is the
            // closest insertion-order proxy.
            Dialect::ClickHouse => format!(
                "SELECT version_id, is_applied FROM {} WHERE service='{}' ORDER BY tstamp DESC;",
                table, service
            ),
            _ => format!(
                "SELECT version_id, is_applied FROM {} WHERE service='{}' ORDER BY id DESC;",
                table, service
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_rejects_unknown_engines() {
        let err = Dialect::from_name("oracle").unwrap_err();
        assert!(matches!(
            err,
            crate::error::MigrateError::UnsupportedDialect(ref name) if name == "oracle"
        ));
    }

    #[test]
    fn from_name_round_trips_every_engine() {
        for name in [
            "postgres",
            "mysql",
            "sqlite3",
            "mssql",
            "redshift",
            "tidb",
            "clickhouse",
        ] {
            assert_eq!(Dialect::from_name(name).unwrap().name(), name);
        }
    }

    #[test]
    fn postgres_templates_use_dollar_placeholders() {
        let insert = Dialect::Postgres.insert_event_sql("waymark_db_version", "billing");
        assert_eq!(
            insert,
            "INSERT INTO waymark_db_version (version_id, is_applied, service) VALUES ($1, $2, 'billing');"
        );
        let delete = Dialect::Postgres.delete_events_sql("waymark_db_version", "billing");
        assert!(delete.contains("version_id=$1"));
        assert!(delete.contains("service='billing'"));
    }

    #[test]
    fn mysql_and_sqlite_use_question_mark_placeholders() {
        for dialect in [Dialect::MySql, Dialect::Sqlite3, Dialect::TiDb] {
            let sql = dialect.insert_event_sql("t", "svc");
            assert!(sql.contains("VALUES (?, ?, 'svc')"), "{}", sql);
        }
    }

    #[test]
    fn sqlserver_uses_named_placeholders_and_top() {
        let delete = Dialect::SqlServer.delete_events_sql("t", "svc");
        assert!(delete.contains("@p1"));
        let latest = Dialect::SqlServer.latest_event_sql("t", "svc");
        assert!(latest.starts_with("SELECT TOP 1"));
        assert!(!latest.contains("LIMIT"));
    }

    #[test]
    fn clickhouse_deletes_via_alter_table() {
        let delete = Dialect::ClickHouse.delete_events_sql("t", "svc");
        assert!(delete.starts_with("ALTER TABLE t DELETE"));
        let scan = Dialect::ClickHouse.ledger_scan_sql("t", "svc");
        assert!(scan.contains("ORDER BY tstamp DESC"));
    }

    #[test]
    fn table_name_is_interpolated_at_call_time() {
        let before = Dialect::Postgres.create_table_sql("first_table");
        let after = Dialect::Postgres.create_table_sql("second_table");
        assert!(before.contains("first_table"));
        assert!(after.contains("second_table"));
    }

    #[test]
    fn scan_is_scoped_by_service_and_insertion_ordered() {
        let sql = Dialect::Postgres.ledger_scan_sql("t", "svc");
        assert_eq!(
            sql,
            "SELECT version_id, is_applied FROM t WHERE service='svc' ORDER BY id DESC;"
        );
    }
}
