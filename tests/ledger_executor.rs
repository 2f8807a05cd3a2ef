//! Ledger derivation and executor edge cases against the in-memory double

mod common;

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use common::MemoryDb;
use waymark::{
    Direction, Executor, Ledger, MigrateError, MigrationConfig, MigrationKind, MigrationRunner,
};

const TABLE: &str = "waymark_db_version";

#[tokio::test]
async fn absent_table_reads_as_version_zero_and_gets_created() {
    let db = MemoryDb::new(TABLE);
    let config = MigrationConfig::default();
    let ledger = Ledger::new(&db, &config, "svc");

    assert!(!db.table_exists());
    assert_eq!(ledger.current_version().await.unwrap(), 0);
    assert!(db.table_exists());

    // second read goes through the table instead of recreating it
    assert_eq!(ledger.current_version().await.unwrap(), 0);
    assert_eq!(db.ledger(), vec![(0, true)]);
}

#[tokio::test]
async fn current_version_keeps_the_most_recent_row_per_version() {
    let db = MemoryDb::new(TABLE);
    let config = MigrationConfig::default();
    let ledger = Ledger::new(&db, &config, "svc");

    db.seed_event("svc", 1, true);
    db.seed_event("svc", 2, true);
    db.seed_event("svc", 2, false); // later row wins for version 2

    assert_eq!(ledger.current_version().await.unwrap(), 1);

    let snapshot = ledger.status_snapshot().await.unwrap();
    assert_eq!(snapshot.get(&1), Some(&true));
    assert_eq!(snapshot.get(&2), Some(&false));
}

#[tokio::test]
async fn current_version_is_the_highest_surviving_applied_version() {
    let db = MemoryDb::new(TABLE);
    let config = MigrationConfig::default();
    let ledger = Ledger::new(&db, &config, "svc");

    db.seed_event("svc", 3, true);
    db.seed_event("svc", 1, true); // applied later but lower

    assert_eq!(ledger.current_version().await.unwrap(), 3);
}

#[tokio::test]
async fn ledger_rows_are_scoped_by_service() {
    let db = MemoryDb::new(TABLE);
    let config = MigrationConfig::default();

    db.seed_event("billing", 5, true);
    db.seed_event("accounts", 2, true);

    let billing = Ledger::new(&db, &config, "billing");
    let accounts = Ledger::new(&db, &config, "accounts");
    assert_eq!(billing.current_version().await.unwrap(), 5);
    assert_eq!(accounts.current_version().await.unwrap(), 2);
}

#[tokio::test]
async fn latest_event_is_none_for_unknown_versions() {
    let db = MemoryDb::new(TABLE);
    let config = MigrationConfig::default();
    let ledger = Ledger::new(&db, &config, "svc");

    db.seed_event("svc", 1, true);

    assert!(ledger.latest_event(1).await.unwrap().unwrap().is_applied);
    assert!(ledger.latest_event(2).await.unwrap().is_none());
}

#[tokio::test]
async fn record_revert_purges_every_event_for_the_version() {
    let db = MemoryDb::new(TABLE);
    let config = MigrationConfig::default();
    let ledger = Ledger::new(&db, &config, "svc");

    db.seed_event("svc", 2, true);
    db.seed_event("svc", 2, false);
    db.seed_event("svc", 2, true);
    db.seed_event("svc", 3, true);

    ledger.record_revert(2).await.unwrap();

    let versions: Vec<i64> = db.ledger().into_iter().map(|(v, _)| v).collect();
    assert_eq!(versions, vec![3]);
}

#[tokio::test]
async fn source_unavailable_propagates_from_the_executor() {
    let db = MemoryDb::new(TABLE);
    let config = MigrationConfig::default();
    let executor = Executor::new(&db, &config);

    let migration = waymark::Migration {
        service: "svc".to_string(),
        version: 1,
        next: None,
        previous: None,
        source: "/nonexistent/00001_missing.sql".to_string(),
        kind: MigrationKind::Script,
        registered: false,
        up_fn: None,
        down_fn: None,
    };

    let err = executor.run(&migration, Direction::Up).await.unwrap_err();
    assert!(matches!(err, MigrateError::SourceUnavailable { .. }));
}

#[tokio::test]
async fn custom_table_name_is_used_for_every_ledger_statement() {
    let db = MemoryDb::new("deploy_history");
    let config = MigrationConfig::default().with_table_name("deploy_history");
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("00001_first.sql"),
        "-- +waymark Up\nCREATE TABLE t (id int);\n-- +waymark Down\nDROP TABLE t;\n",
    )
    .unwrap();

    let runner = MigrationRunner::new(Arc::new(db.clone()), config, "svc", tmp.path());
    runner.up().await.unwrap();

    assert!(db.table_exists());
    assert_eq!(runner.version().await.unwrap(), 1);
}

#[tokio::test]
async fn duplicate_registration_never_reaches_the_catalog() {
    let db = MemoryDb::new(TABLE);
    let tmp = TempDir::new().unwrap();
    let mut runner = MigrationRunner::new(
        Arc::new(db.clone()),
        MigrationConfig::default(),
        "svc",
        tmp.path(),
    );

    runner
        .registry_mut()
        .register("svc", 7, "00007_first", None, None)
        .unwrap();
    let err = runner
        .registry_mut()
        .register("svc", 7, "00007_second", None, None)
        .unwrap_err();
    assert!(matches!(err, MigrateError::DuplicateVersion { version: 7, .. }));

    // only the first registration is in the catalog
    let status = runner.status().await.unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].source, "00007_first");
}
