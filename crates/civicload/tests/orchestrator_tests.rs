//! Orchestrator integration tests
//!
//! Full runs over the in-memory database with both strategies.

mod common;

use civicload::batch::BatchInsertLoader;
use civicload::bulk::{
    BulkImportStrategy, BulkQueryBuilder, ExternalSourceBootstrapper, ExternalSourceConfig,
    OpenRowsetQueryBuilder,
};
use civicload::db::DbError;
use civicload::orchestrator::TableState;
use civicload::spec::{CastRule, TableSpec};
use civicload::{LoadOrchestrator, LoaderError};
use common::{init_tracing, write_csv, FakeDatabase};
use tempfile::TempDir;

fn spec(table: &str) -> TableSpec {
    TableSpec::builder(format!("{}.csv", table), table)
        .column(1, "id", 20)
        .column(2, "label", 100)
        .cast("id", CastRule::Int)
        .primary_key("id")
        .build()
}

fn external_source() -> ExternalSourceBootstrapper {
    ExternalSourceBootstrapper::new(ExternalSourceConfig {
        data_source_name: "CsvBlobStorage".into(),
        credential_name: "BlobSasCredential".into(),
        location: "https://civicdata.blob.core.windows.net/csvdata".into(),
        sas_token: "sv=2022&sig=abc".into(),
        master_key_password: None,
    })
}

fn bulk_orchestrator(specs: Vec<TableSpec>) -> LoadOrchestrator {
    LoadOrchestrator::new(specs, BulkImportStrategy::open_rowset("CsvBlobStorage"))
        .with_bootstrapper(external_source())
}

#[tokio::test]
async fn test_failed_table_does_not_stop_the_run() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    write_csv(dir.path(), "first.csv", &["id,label", "1,a", "2,b"]);
    write_csv(dir.path(), "third.csv", &["id,label", "1,c"]);

    let db = FakeDatabase::postgres()
        .with_table("first")
        .with_table("second")
        .with_table("third");
    let orchestrator = LoadOrchestrator::new(
        vec![spec("first"), spec("second"), spec("third")],
        BatchInsertLoader::new(dir.path()),
    );

    let summary = orchestrator.run(db.boxed()).await.unwrap();

    assert_eq!(summary.tables.len(), 3);
    assert!(matches!(summary.get("first").unwrap().state, TableState::Completed(_)));
    assert!(matches!(summary.get("second").unwrap().state, TableState::Failed(_)));
    assert!(matches!(summary.get("third").unwrap().state, TableState::Completed(_)));
    assert_eq!(summary.failed().count(), 1);
    assert_eq!(summary.total_committed(), 3);

    // every table is counted, including the failed one
    assert_eq!(summary.get("second").unwrap().final_count, Some(0));
    assert!(db.is_closed());
}

#[tokio::test]
async fn test_tables_load_in_the_given_order() {
    let dir = TempDir::new().unwrap();
    for table in ["zoning", "parcels", "permits"] {
        write_csv(dir.path(), &format!("{}.csv", table), &["id,label", "1,x"]);
    }

    let db = FakeDatabase::postgres()
        .with_table("zoning")
        .with_table("parcels")
        .with_table("permits");
    let orchestrator = LoadOrchestrator::new(
        vec![spec("zoning"), spec("parcels"), spec("permits")],
        BatchInsertLoader::new(dir.path()),
    );
    let summary = orchestrator.run(db.boxed()).await.unwrap();

    let order: Vec<String> = db.state().inserts.iter().map(|(t, _)| t.clone()).collect();
    assert_eq!(order, vec!["zoning", "parcels", "permits"]);
    let reported: Vec<&str> = summary.tables.iter().map(|t| t.table.as_str()).collect();
    assert_eq!(reported, vec!["zoning", "parcels", "permits"]);
}

#[tokio::test]
async fn test_final_count_includes_existing_rows() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    write_csv(
        dir.path(),
        "people.csv",
        &["id,label", "1,Alice", "2,", "bad,row,too,many,fields"],
    );

    let db = FakeDatabase::postgres()
        .with_table("people")
        .with_preexisting("people", 7);
    let orchestrator = LoadOrchestrator::new(vec![spec("people")], BatchInsertLoader::new(dir.path()));
    let summary = orchestrator.run(db.boxed()).await.unwrap();

    let report = summary.get("people").unwrap();
    let stats = report.stats().unwrap();
    assert_eq!(stats.attempted, 3);
    assert_eq!(stats.committed, 2);
    assert_eq!(stats.errored, 1);
    assert_eq!(report.final_count, Some(9));
}

#[tokio::test]
async fn test_count_failure_is_reported_as_unavailable() {
    let dir = TempDir::new().unwrap();
    write_csv(dir.path(), "people.csv", &["id,label", "1,Alice"]);

    let db = FakeDatabase::postgres()
        .with_table("people")
        .failing_count("people");
    let orchestrator = LoadOrchestrator::new(vec![spec("people")], BatchInsertLoader::new(dir.path()));
    let summary = orchestrator.run(db.boxed()).await.unwrap();

    let report = summary.get("people").unwrap();
    assert!(matches!(report.state, TableState::Completed(_)));
    assert_eq!(report.final_count, None);
}

#[tokio::test]
async fn test_lost_connection_aborts_and_closes() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    write_csv(dir.path(), "first.csv", &["id,label", "1,a"]);
    write_csv(dir.path(), "second.csv", &["id,label", "1,b"]);

    let db = FakeDatabase::postgres()
        .with_table("first")
        .with_table("second")
        .failing_inserts(DbError::Connection("connection reset by peer".into()));
    let orchestrator = LoadOrchestrator::new(
        vec![spec("first"), spec("second")],
        BatchInsertLoader::new(dir.path()),
    );

    let err = orchestrator.run(db.boxed()).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(db.is_closed());

    // the second table was never attempted
    let tables: Vec<String> = db.state().inserts.iter().map(|(t, _)| t.clone()).collect();
    assert_eq!(tables, vec!["first"]);
}

#[tokio::test]
async fn test_bulk_strategy_is_rejected_on_postgres() {
    let db = FakeDatabase::postgres().with_table("people");
    let err = bulk_orchestrator(vec![spec("people")])
        .run(db.boxed())
        .await
        .unwrap_err();

    assert!(matches!(err, LoaderError::UnsupportedStrategy { .. }));
    assert!(db.is_closed());
    assert!(db.state().statements.is_empty());
}

#[tokio::test]
async fn test_bulk_without_external_source_is_a_config_error() {
    let db = FakeDatabase::sql_server().with_table("people");
    let orchestrator = LoadOrchestrator::new(
        vec![spec("people")],
        BulkImportStrategy::open_rowset("CsvBlobStorage"),
    );

    let err = orchestrator.run(db.boxed()).await.unwrap_err();
    assert!(matches!(err, LoaderError::Config(_)));
    assert!(db.is_closed());
}

#[tokio::test]
async fn test_bulk_run_bootstraps_then_loads_each_table() {
    init_tracing();
    let db = FakeDatabase::sql_server()
        .with_table("parcels")
        .with_table("permits")
        .with_preexisting("permits", 4)
        .with_bulk_result("parcels", Ok(120))
        .with_bulk_result("permits", Ok(30));

    let summary = bulk_orchestrator(vec![spec("parcels"), spec("permits")])
        .run(db.boxed())
        .await
        .unwrap();

    let state = db.state();
    assert!(state.data_sources.contains_key("CsvBlobStorage"));
    let first_insert = state
        .statements
        .iter()
        .position(|s| s.starts_with("INSERT INTO"))
        .unwrap();
    let data_source_created = state
        .statements
        .iter()
        .position(|s| s.starts_with("CREATE EXTERNAL DATA SOURCE"))
        .unwrap();
    assert!(data_source_created < first_insert);
    drop(state);

    let parcels = summary.get("parcels").unwrap();
    assert_eq!(parcels.stats().unwrap().committed, 120);
    assert_eq!(parcels.final_count, Some(120));
    assert_eq!(summary.get("permits").unwrap().final_count, Some(34));
    assert_eq!(summary.total_committed(), 150);
    assert!(db.is_closed());
}

#[tokio::test]
async fn test_bulk_statement_failure_fails_only_that_table() {
    init_tracing();
    let db = FakeDatabase::sql_server()
        .with_table("parcels")
        .with_table("permits")
        .with_table("licenses")
        .with_bulk_result("parcels", Ok(10))
        .with_bulk_result(
            "permits",
            Err(DbError::Rejected("Cannot bulk load. The file \"permits.csv\" does not exist".into())),
        )
        .with_bulk_result("licenses", Ok(5));

    let summary = bulk_orchestrator(vec![spec("parcels"), spec("permits"), spec("licenses")])
        .run(db.boxed())
        .await
        .unwrap();

    match &summary.get("permits").unwrap().state {
        TableState::Failed(reason) => assert!(reason.contains("permits.csv")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(summary.get("licenses").unwrap().final_count, Some(5));
    assert_eq!(summary.failed().count(), 1);
}

#[tokio::test]
async fn test_bootstrap_failure_aborts_before_any_table() {
    init_tracing();
    let db = FakeDatabase::sql_server()
        .with_table("parcels")
        .failing_statement(
            "CREATE DATABASE SCOPED CREDENTIAL",
            DbError::Rejected("permission denied".into()),
        );

    let err = bulk_orchestrator(vec![spec("parcels")])
        .run(db.boxed())
        .await
        .unwrap_err();

    assert!(matches!(err, LoaderError::ExternalSource { .. }));
    assert!(db.is_closed());
    assert!(!db.state().statements.iter().any(|s| s.starts_with("INSERT INTO")));
}

#[test]
fn test_only_bulk_path_filters_on_primary_key() {
    let query = OpenRowsetQueryBuilder::new("CsvBlobStorage").build(&spec("people"));
    assert!(query.contains("WHERE TRY_CAST(NULLIF(LTRIM(RTRIM([c_id])), '') AS INT) IS NOT NULL"));

    let no_key = TableSpec::builder("notes.csv", "notes")
        .column(1, "body", 200)
        .build();
    let query = OpenRowsetQueryBuilder::new("CsvBlobStorage").build(&no_key);
    assert!(!query.contains("WHERE"));
}
