//! Common test utilities for civicload integration tests
//!
//! [`FakeDatabase`] is an in-memory stand-in for a real connection. It keeps
//! enough state to exercise the loader end to end:
//!
//! - tables with NOT NULL and UNIQUE constraints, checked atomically per insert
//! - master key, scoped credentials and external data sources, with the same
//!   "drop what is missing fails" and "drop a referenced credential fails"
//!   behaviour as SQL Server
//! - canned results for bulk `INSERT .. SELECT` statements
//! - injectable failures and a log of every call
//!
//! The state lives behind an `Arc` so tests can inspect it after the
//! orchestrator has consumed and closed the connection.

#![allow(dead_code)]

use async_trait::async_trait;
use civicload::db::{Database, DbError, DbResult, Dialect, InsertPlan};
use civicload::normalize::{Row, SqlValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// One stored row, by column name
pub type StoredRow = BTreeMap<String, Option<SqlValue>>;

#[derive(Debug, Default, Clone)]
pub struct FakeTable {
    pub rows: Vec<StoredRow>,
    /// Rows that existed before the run (counted, not inspected)
    pub preexisting: i64,
    /// Rows added by bulk statements
    pub bulk_rows: i64,
    pub not_null: Vec<String>,
    pub unique: Vec<String>,
}

impl FakeTable {
    pub fn count(&self) -> i64 {
        self.preexisting + self.bulk_rows + self.rows.len() as i64
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub tables: HashMap<String, FakeTable>,
    pub master_key: bool,
    /// credential name -> secret
    pub credentials: HashMap<String, String>,
    /// data source name -> (location, credential name)
    pub data_sources: HashMap<String, (String, String)>,
    /// target table -> result of its bulk statement
    pub bulk_results: HashMap<String, DbResult<u64>>,
    /// Any statement containing the key fails with the error
    pub statement_failures: Vec<(String, DbError)>,
    /// Every insert fails with this error
    pub insert_failure: Option<DbError>,
    pub count_failures: HashSet<String>,
    /// Executed statements, in order
    pub statements: Vec<String>,
    /// Row count of every `insert_rows` call, per table
    pub inserts: Vec<(String, usize)>,
    pub closed: bool,
}

#[derive(Clone)]
pub struct FakeDatabase {
    dialect: Dialect,
    state: Arc<Mutex<FakeState>>,
}

impl FakeDatabase {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    pub fn postgres() -> Self {
        Self::new(Dialect::Postgres)
    }

    pub fn sql_server() -> Self {
        Self::new(Dialect::SqlServer)
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_table(self, name: &str) -> Self {
        self.state().tables.insert(name.to_string(), FakeTable::default());
        self
    }

    pub fn with_not_null(self, table: &str, column: &str) -> Self {
        self.table_mut(table, |t| t.not_null.push(column.to_string()));
        self
    }

    pub fn with_unique(self, table: &str, column: &str) -> Self {
        self.table_mut(table, |t| t.unique.push(column.to_string()));
        self
    }

    pub fn with_preexisting(self, table: &str, rows: i64) -> Self {
        self.table_mut(table, |t| t.preexisting = rows);
        self
    }

    pub fn with_bulk_result(self, table: &str, result: DbResult<u64>) -> Self {
        self.state().bulk_results.insert(table.to_string(), result);
        self
    }

    pub fn failing_statement(self, contains: &str, error: DbError) -> Self {
        self.state()
            .statement_failures
            .push((contains.to_string(), error));
        self
    }

    pub fn failing_inserts(self, error: DbError) -> Self {
        self.state().insert_failure = Some(error);
        self
    }

    pub fn failing_count(self, table: &str) -> Self {
        self.state().count_failures.insert(table.to_string());
        self
    }

    pub fn rows(&self, table: &str) -> Vec<StoredRow> {
        self.state()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn boxed(&self) -> Box<dyn Database> {
        Box::new(self.clone())
    }

    fn table_mut(&self, table: &str, f: impl FnOnce(&mut FakeTable)) {
        let mut state = self.state();
        f(state.tables.entry(table.to_string()).or_default());
    }
}

#[async_trait]
impl Database for FakeDatabase {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let mut state = self.state();
        state.statements.push(sql.to_string());

        if let Some((_, error)) = state
            .statement_failures
            .iter()
            .find(|(key, _)| sql.contains(key.as_str()))
        {
            return Err(error.clone());
        }

        execute_statement(&mut state, sql)
    }

    async fn insert_rows(&mut self, plan: &InsertPlan, rows: &[Row]) -> DbResult<u64> {
        let mut state = self.state();
        state.inserts.push((plan.table.clone(), rows.len()));

        if let Some(ref error) = state.insert_failure {
            return Err(error.clone());
        }

        let table = state
            .tables
            .get_mut(&plan.table)
            .ok_or_else(|| DbError::Rejected(format!("Invalid object name '{}'", plan.table)))?;

        let mut staged: Vec<StoredRow> = Vec::with_capacity(rows.len());
        for row in rows {
            let stored: StoredRow = plan
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| (c.name.clone(), row.get(i).cloned().flatten()))
                .collect();

            for column in &table.not_null {
                if stored.get(column).map_or(true, Option::is_none) {
                    return Err(DbError::Rejected(format!(
                        "Cannot insert the value NULL into column '{}'",
                        column
                    )));
                }
            }
            for column in &table.unique {
                let value = stored.get(column).cloned().flatten();
                if value.is_some()
                    && table
                        .rows
                        .iter()
                        .chain(staged.iter())
                        .any(|r| r.get(column).cloned().flatten() == value)
                {
                    return Err(DbError::Rejected(format!(
                        "Violation of UNIQUE KEY constraint on '{}'",
                        column
                    )));
                }
            }
            staged.push(stored);
        }

        let inserted = staged.len() as u64;
        table.rows.extend(staged);
        Ok(inserted)
    }

    async fn count_rows(&mut self, table: &str) -> DbResult<i64> {
        let state = self.state();
        if state.count_failures.contains(table) {
            return Err(DbError::Rejected(format!("permission denied on '{}'", table)));
        }
        state
            .tables
            .get(table)
            .map(FakeTable::count)
            .ok_or_else(|| DbError::Rejected(format!("Invalid object name '{}'", table)))
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.state().closed = true;
        Ok(())
    }
}

fn execute_statement(state: &mut FakeState, sql: &str) -> DbResult<u64> {
    let rejected = |msg: String| -> DbResult<u64> { Err(DbError::Rejected(msg)) };

    if sql.starts_with("CREATE MASTER KEY") {
        if state.master_key {
            return rejected("There is already a master key in the database".into());
        }
        state.master_key = true;
        return Ok(0);
    }

    if let Some(name) = sql.strip_prefix("DROP EXTERNAL DATA SOURCE ") {
        let name = name.trim();
        return match state.data_sources.remove(name) {
            Some(_) => Ok(0),
            None => rejected(format!("Cannot drop the external data source '{}'", name)),
        };
    }

    if let Some(name) = sql.strip_prefix("DROP DATABASE SCOPED CREDENTIAL ") {
        let name = name.trim();
        if state.data_sources.values().any(|(_, cred)| cred == name) {
            return rejected(format!("Credential '{}' is in use", name));
        }
        return match state.credentials.remove(name) {
            Some(_) => Ok(0),
            None => rejected(format!("Cannot drop the credential '{}'", name)),
        };
    }

    if let Some(rest) = sql.strip_prefix("CREATE DATABASE SCOPED CREDENTIAL ") {
        let name = first_word(rest);
        if state.credentials.contains_key(&name) {
            return rejected(format!("Credential '{}' already exists", name));
        }
        let secret = quoted_after(rest, "SECRET = '").unwrap_or_default();
        state.credentials.insert(name, secret);
        return Ok(0);
    }

    if let Some(rest) = sql.strip_prefix("CREATE EXTERNAL DATA SOURCE ") {
        let name = first_word(rest);
        if state.data_sources.contains_key(&name) {
            return rejected(format!("External data source '{}' already exists", name));
        }
        let location = quoted_after(rest, "LOCATION = '").unwrap_or_default();
        let credential = rest
            .split("CREDENTIAL = ")
            .nth(1)
            .map(|s| s.trim_end_matches(')').trim().to_string())
            .unwrap_or_default();
        if !state.credentials.contains_key(&credential) {
            return rejected(format!("Credential '{}' does not exist", credential));
        }
        state.data_sources.insert(name, (location, credential));
        return Ok(0);
    }

    if let Some(rest) = sql.strip_prefix("INSERT INTO ") {
        let table = first_word(rest)
            .trim_matches(|c| c == '[' || c == ']' || c == '"')
            .to_string();
        let result = state.bulk_results.get(&table).cloned().unwrap_or(Ok(0));
        if let Ok(n) = result {
            match state.tables.get_mut(&table) {
                Some(t) => t.bulk_rows += n as i64,
                None => return rejected(format!("Invalid object name '{}'", table)),
            }
        }
        return result;
    }

    Ok(0)
}

fn first_word(s: &str) -> String {
    s.split_whitespace().next().unwrap_or_default().to_string()
}

fn quoted_after(s: &str, marker: &str) -> Option<String> {
    let start = s.find(marker)? + marker.len();
    let end = s[start..].find('\'')? + start;
    Some(s[start..end].to_string())
}

/// Write a CSV fixture and return its path
pub fn write_csv(dir: &Path, name: &str, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(&path, content).unwrap_or_else(|e| panic!("failed to write {}: {}", path.display(), e));
    path
}

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,civicload=debug")),
        )
        .with_test_writer()
        .try_init();
}
