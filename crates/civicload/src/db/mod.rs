//! Database backends
//!
//! The loader talks to exactly one connection per run through the
//! [`Database`] trait. Each backend owns a single, non-pooled connection;
//! statements outside [`Database::insert_rows`] commit on their own.

pub mod postgres;

#[cfg(feature = "mssql")]
pub mod mssql;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::config::DatabaseTarget;
use crate::normalize::Row;
use crate::spec::CastRule;

pub use postgres::PgDatabase;

#[cfg(feature = "mssql")]
pub use mssql::MssqlDatabase;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// The server rejected the statement; the connection is still usable
    #[error("Statement rejected: {0}")]
    Rejected(String),

    /// The connection could not be opened or was lost
    #[error("Database connection error: {0}")]
    Connection(String),

    /// The backend cannot do what was asked
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl DbError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// SQL dialect spoken by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    SqlServer,
}

impl Dialect {
    /// Quote an identifier for this dialect
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::SqlServer => format!("[{}]", ident.replace(']', "]]")),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => f.write_str("postgres"),
            Dialect::SqlServer => f.write_str("sqlserver"),
        }
    }
}

/// One target column of a client-side insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertColumn {
    pub name: String,
    /// `None` binds as text
    pub cast: Option<CastRule>,
}

/// Target table and column order that normalized rows are aligned to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertPlan {
    pub table: String,
    pub columns: Vec<InsertColumn>,
}

impl InsertPlan {
    pub fn new(table: impl Into<String>, columns: Vec<InsertColumn>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Quoted, comma-separated column list
    pub fn column_list(&self, dialect: Dialect) -> String {
        self.columns
            .iter()
            .map(|c| dialect.quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A single database connection used for a whole run
#[async_trait]
pub trait Database: Send {
    fn dialect(&self) -> Dialect;

    /// Run one statement and return the number of affected rows
    async fn execute(&mut self, sql: &str) -> DbResult<u64>;

    /// Insert `rows` in one all-or-nothing operation
    async fn insert_rows(&mut self, plan: &InsertPlan, rows: &[Row]) -> DbResult<u64>;

    async fn count_rows(&mut self, table: &str) -> DbResult<i64>;

    /// Release the connection
    async fn close(self: Box<Self>) -> DbResult<()>;
}

/// Open the connection described by `target`
pub async fn connect(target: &DatabaseTarget) -> DbResult<Box<dyn Database>> {
    match target {
        DatabaseTarget::Postgres { url, token } => {
            let db = PgDatabase::connect(url, token.as_deref()).await?;
            Ok(Box::new(db))
        },
        #[cfg(feature = "mssql")]
        DatabaseTarget::SqlServer(target) => {
            let db = MssqlDatabase::connect(target).await?;
            Ok(Box::new(db))
        },
        #[cfg(not(feature = "mssql"))]
        DatabaseTarget::SqlServer(_) => Err(DbError::Unsupported(
            "SQL Server support requires the 'mssql' feature".to_string(),
        )),
    }
}
