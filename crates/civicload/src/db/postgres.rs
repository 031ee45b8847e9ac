//! PostgreSQL backend over a single sqlx connection
//!
//! Multi-row inserts bind one typed array per column and expand them with
//! `UNNEST`, so the number of bind parameters equals the number of columns
//! no matter how large the batch is.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Postgres, QueryBuilder};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Database, DbError, DbResult, Dialect, InsertPlan};
use crate::normalize::{Row, SqlValue};
use crate::spec::CastRule;

const APPLICATION_NAME: &str = "civicload";

pub struct PgDatabase {
    conn: PgConnection,
}

impl PgDatabase {
    /// Connect to `url`; a token, when given, is sent as the password
    pub async fn connect(url: &str, token: Option<&str>) -> DbResult<Self> {
        let mut options = PgConnectOptions::from_str(url)
            .map_err(|e| DbError::Connection(format!("invalid DATABASE_URL: {}", e)))?
            .application_name(APPLICATION_NAME);
        if let Some(token) = token {
            options = options.password(token);
        }

        let conn = PgConnection::connect_with(&options)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        info!(
            host = options.get_host(),
            database = options.get_database().unwrap_or_default(),
            "Connected to PostgreSQL"
        );
        Ok(Self { conn })
    }

    pub fn from_connection(conn: PgConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Database for PgDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let result = sqlx::query(sql).execute(&mut self.conn).await.map_err(from_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn insert_rows(&mut self, plan: &InsertPlan, rows: &[Row]) -> DbResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} ({}) SELECT * FROM UNNEST(",
            Dialect::Postgres.quote_ident(&plan.table),
            plan.column_list(Dialect::Postgres)
        ));

        let mut args = builder.separated(", ");
        for (idx, column) in plan.columns.iter().enumerate() {
            match column.cast {
                None => {
                    args.push_bind(column_values(rows, idx, |v| match v {
                        SqlValue::Text(s) => Some(s.clone()),
                        _ => None,
                    })?);
                },
                Some(CastRule::Int) => {
                    args.push_bind(column_values(rows, idx, |v| match v {
                        SqlValue::Int(i) => Some(*i),
                        _ => None,
                    })?);
                },
                Some(CastRule::BigInt) => {
                    args.push_bind(column_values(rows, idx, |v| match v {
                        SqlValue::BigInt(i) => Some(*i),
                        _ => None,
                    })?);
                },
                Some(CastRule::Float) => {
                    args.push_bind(column_values(rows, idx, |v| match v {
                        SqlValue::Float(f) => Some(*f),
                        _ => None,
                    })?);
                },
                Some(CastRule::Decimal { .. }) => {
                    args.push_bind(column_values::<BigDecimal>(rows, idx, |v| match v {
                        SqlValue::Decimal(d) => Some(d.clone()),
                        _ => None,
                    })?);
                },
                Some(CastRule::Timestamp) => {
                    args.push_bind(column_values::<NaiveDateTime>(rows, idx, |v| match v {
                        SqlValue::Timestamp(t) => Some(*t),
                        _ => None,
                    })?);
                },
                Some(CastRule::Uuid) => {
                    args.push_bind(column_values::<Uuid>(rows, idx, |v| match v {
                        SqlValue::Uuid(u) => Some(*u),
                        _ => None,
                    })?);
                },
            }
            args.push_unseparated(array_cast(column.cast));
        }
        builder.push(")");

        let result = builder
            .build()
            .execute(&mut self.conn)
            .await
            .map_err(from_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn count_rows(&mut self, table: &str) -> DbResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", Dialect::Postgres.quote_ident(table));
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&mut self.conn)
            .await
            .map_err(from_sqlx)
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        debug!("Closing PostgreSQL connection");
        self.conn
            .close()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))
    }
}

/// Array type each column's parameter is cast to inside `UNNEST`
fn array_cast(cast: Option<CastRule>) -> &'static str {
    match cast {
        None => "::text[]",
        Some(CastRule::Int) => "::int4[]",
        Some(CastRule::BigInt) => "::int8[]",
        Some(CastRule::Float) => "::float8[]",
        Some(CastRule::Decimal { .. }) => "::numeric[]",
        Some(CastRule::Timestamp) => "::timestamp[]",
        Some(CastRule::Uuid) => "::uuid[]",
    }
}

/// Collect column `idx` of every row; a value of the wrong variant rejects the batch
fn column_values<T>(
    rows: &[Row],
    idx: usize,
    pick: impl Fn(&SqlValue) -> Option<T>,
) -> DbResult<Vec<Option<T>>> {
    rows.iter()
        .map(|row| match row.get(idx) {
            None | Some(None) => Ok(None),
            Some(Some(value)) => pick(value).map(Some).ok_or_else(|| {
                DbError::Rejected(format!("value {:?} does not match column {}", value, idx))
            }),
        })
        .collect()
}

fn from_sqlx(err: sqlx::Error) -> DbError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => DbError::Connection(err.to_string()),
        _ => DbError::Rejected(err.to_string()),
    }
}
