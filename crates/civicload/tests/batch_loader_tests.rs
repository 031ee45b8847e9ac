//! Batch insert loader integration tests
//!
//! Exercise the client-side path against the in-memory database:
//! batching, per-row fallback, malformed records, narrow files and the
//! absence of a primary-key filter.

mod common;

use civicload::batch::{BatchInsertLoader, TableLoadStats};
use civicload::db::{DbError, InsertColumn, InsertPlan};
use civicload::normalize::SqlValue;
use civicload::orchestrator::LoadStrategy;
use civicload::spec::{CastRule, TableSpec};
use civicload::LoaderError;
use common::{init_tracing, write_csv, FakeDatabase};
use tempfile::TempDir;

fn people() -> TableSpec {
    TableSpec::builder("people.csv", "people")
        .column(1, "id", 20)
        .column(2, "name", 100)
        .cast("id", CastRule::Int)
        .primary_key("id")
        .build()
}

async fn load(db: &FakeDatabase, loader: &BatchInsertLoader, spec: &TableSpec) -> TableLoadStats {
    let mut conn = db.clone();
    loader.load_table(&mut conn, spec).await.unwrap()
}

#[tokio::test]
async fn test_clean_file_loads_every_row() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut lines = vec!["id,name".to_string()];
    lines.extend((1..=12).map(|i| format!("{},person {}", i, i)));
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    write_csv(dir.path(), "people.csv", &lines);

    let db = FakeDatabase::postgres().with_table("people");
    let loader = BatchInsertLoader::new(dir.path()).with_batch_size(5);
    let stats = load(&db, &loader, &people()).await;

    assert_eq!(stats.attempted, 12);
    assert_eq!(stats.committed, 12);
    assert_eq!(stats.errored, 0);
    assert!(stats.sample_errors.is_empty());

    let batches: Vec<usize> = db.state().inserts.iter().map(|(_, n)| *n).collect();
    assert_eq!(batches, vec![5, 5, 2]);

    let rows = db.rows("people");
    assert_eq!(rows.len(), 12);
    assert_eq!(rows[0]["id"], Some(SqlValue::Int(1)));
    assert_eq!(rows[11]["name"], Some(SqlValue::Text("person 12".into())));
}

#[tokio::test]
async fn test_rejected_batch_falls_back_to_single_rows() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    write_csv(
        dir.path(),
        "people.csv",
        &[
            "id,name", "1,Ada", "2,Grace", "3,", "4,Edsger", // first batch: row 3 violates NOT NULL
            "5,Barbara", "6,Donald",
        ],
    );

    let db = FakeDatabase::postgres()
        .with_table("people")
        .with_not_null("people", "name");
    let loader = BatchInsertLoader::new(dir.path()).with_batch_size(4);
    let stats = load(&db, &loader, &people()).await;

    assert_eq!(stats.attempted, 6);
    assert_eq!(stats.committed, 5);
    assert_eq!(stats.errored, 1);
    assert_eq!(stats.sample_errors.len(), 1);
    assert!(stats.sample_errors[0].contains("NULL"));

    // rejected batch of 4, four single-row retries, then the clean batch of 2
    let batches: Vec<usize> = db.state().inserts.iter().map(|(_, n)| *n).collect();
    assert_eq!(batches, vec![4, 1, 1, 1, 1, 2]);

    let ids: Vec<_> = db.rows("people").iter().map(|r| r["id"].clone()).collect();
    assert_eq!(
        ids,
        [1, 2, 4, 5, 6].iter().map(|i| Some(SqlValue::Int(*i))).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_malformed_record_is_a_row_error() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    write_csv(
        dir.path(),
        "people.csv",
        &["id,name", "1,Alice", "2,", "bad,row,too,many,fields"],
    );

    let db = FakeDatabase::postgres()
        .with_table("people")
        .with_preexisting("people", 7);
    let loader = BatchInsertLoader::new(dir.path());
    let stats = load(&db, &loader, &people()).await;

    assert_eq!(stats.attempted, 3);
    assert_eq!(stats.committed, 2);
    assert_eq!(stats.errored, 1);
    assert!(stats.sample_errors[0].contains("5 fields"));

    let rows = db.rows("people");
    assert_eq!(rows[1]["id"], Some(SqlValue::Int(2)));
    assert_eq!(rows[1]["name"], None);
    assert_eq!(db.state().tables["people"].count(), 9);
}

#[tokio::test]
async fn test_empty_primary_key_is_still_attempted() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    write_csv(dir.path(), "people.csv", &["id,name", "1,Ada", ",Nobody", "3,Grace"]);

    let db = FakeDatabase::postgres().with_table("people");
    let loader = BatchInsertLoader::new(dir.path());
    let stats = load(&db, &loader, &people()).await;

    assert_eq!(stats.attempted, 3);
    assert_eq!(stats.committed, 3);
    let rows = db.rows("people");
    assert_eq!(rows[1]["id"], None);
    assert_eq!(rows[1]["name"], Some(SqlValue::Text("Nobody".into())));
}

#[tokio::test]
async fn test_empty_primary_key_rejected_by_target_is_counted() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    write_csv(dir.path(), "people.csv", &["id,name", "1,Ada", ",Nobody", "3,Grace"]);

    let db = FakeDatabase::postgres()
        .with_table("people")
        .with_not_null("people", "id");
    let loader = BatchInsertLoader::new(dir.path());
    let stats = load(&db, &loader, &people()).await;

    assert_eq!(stats.attempted, 3);
    assert_eq!(stats.committed, 2);
    assert_eq!(stats.errored, 1);
}

#[tokio::test]
async fn test_narrow_file_skips_missing_columns() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    write_csv(dir.path(), "permits.csv", &["permit,address", "P-1,1 Market St", "P-2,  "]);

    let spec = TableSpec::builder("permits.csv", "permits")
        .column(1, "permitnumber", 30)
        .column(2, "address", 200)
        .column(3, "issued", 50)
        .cast("issued", CastRule::Timestamp)
        .build();
    let db = FakeDatabase::postgres().with_table("permits");
    let loader = BatchInsertLoader::new(dir.path());
    let stats = load(&db, &loader, &spec).await;

    assert_eq!(stats.committed, 2);
    let rows = db.rows("permits");
    assert!(!rows[0].contains_key("issued"));
    assert_eq!(rows[0]["address"], Some(SqlValue::Text("1 Market St".into())));
    assert_eq!(rows[1]["address"], None);
}

#[tokio::test]
async fn test_unparseable_cast_becomes_null() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    write_csv(
        dir.path(),
        "people.csv",
        &["id,name", "1,Ada", "two,Grace", "\"3\",\"Hopper, Grace\""],
    );

    let db = FakeDatabase::postgres().with_table("people");
    let loader = BatchInsertLoader::new(dir.path());
    let stats = load(&db, &loader, &people()).await;

    assert_eq!(stats.committed, 3);
    assert_eq!(stats.errored, 0);
    let rows = db.rows("people");
    assert_eq!(rows[1]["id"], None);
    assert_eq!(rows[2]["name"], Some(SqlValue::Text("Hopper, Grace".into())));
}

#[tokio::test]
async fn test_long_text_is_truncated() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let long = "x".repeat(2001);
    let line = format!("1,{}", long);
    write_csv(dir.path(), "people.csv", &["id,name", &line]);

    let db = FakeDatabase::postgres().with_table("people");
    let loader = BatchInsertLoader::new(dir.path());
    load(&db, &loader, &people()).await;

    let rows = db.rows("people");
    assert_eq!(rows[0]["name"], Some(SqlValue::Text("x".repeat(2000))));
}

#[tokio::test]
async fn test_missing_source_file_fails_table() {
    let dir = TempDir::new().unwrap();
    let db = FakeDatabase::postgres().with_table("people");
    let loader = BatchInsertLoader::new(dir.path());

    let mut conn = db.clone();
    let err = loader.load_table(&mut conn, &people()).await.unwrap_err();
    assert!(matches!(err, LoaderError::SourceMissing(_)));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_lost_connection_propagates() {
    let dir = TempDir::new().unwrap();
    write_csv(dir.path(), "people.csv", &["id,name", "1,Ada"]);

    let db = FakeDatabase::postgres()
        .with_table("people")
        .failing_inserts(DbError::Connection("connection reset".into()));
    let loader = BatchInsertLoader::new(dir.path());

    let mut conn = db.clone();
    let err = loader.load_table(&mut conn, &people()).await.unwrap_err();
    assert!(err.is_fatal());
    // no per-row retries after a connection failure
    assert_eq!(db.state().inserts.len(), 1);
}

#[tokio::test]
async fn test_fallback_writer_reports_outcome() {
    use civicload::batch::FallbackWriter;
    use civicload::db::Database;

    let db = FakeDatabase::postgres()
        .with_table("codes")
        .with_unique("codes", "code");
    let plan = InsertPlan::new(
        "codes",
        vec![InsertColumn {
            name: "code".into(),
            cast: None,
        }],
    );
    let text = |s: &str| vec![Some(SqlValue::Text(s.to_string()))];
    let rows = vec![text("a"), text("b"), text("a"), text("c")];

    let mut conn = db.clone();
    let outcome = FallbackWriter::new(&plan)
        .write(&mut conn as &mut dyn Database, &rows)
        .await
        .unwrap();

    assert!(outcome.degraded);
    assert_eq!(outcome.committed, 3);
    assert_eq!(outcome.errored, 1);
    assert_eq!(outcome.errors.len(), 1);
}
