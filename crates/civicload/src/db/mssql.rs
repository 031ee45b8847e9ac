//! SQL Server / Azure SQL backend over a single tiberius client
//!
//! Authentication uses an Azure AD access token supplied out of band. A batch
//! is split into statements that stay under the server's parameter and
//! row-constructor limits; the statements share one transaction so the batch
//! commits or fails as a unit.

use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use std::borrow::Cow;
use tiberius::numeric::Numeric;
use tiberius::{AuthMethod, Client, ColumnData, Config, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use super::{Database, DbError, DbResult, Dialect, InsertPlan};
use crate::config::SqlServerTarget;
use crate::normalize::{Row, SqlValue};
use crate::spec::CastRule;

/// Stay under the 2100 parameters a single request may carry
const MAX_PARAMS_PER_STATEMENT: usize = 2000;

/// A table value constructor takes at most 1000 rows
const MAX_ROWS_PER_STATEMENT: usize = 1000;

const APPLICATION_NAME: &str = "civicload";

pub struct MssqlDatabase {
    client: Client<Compat<TcpStream>>,
}

impl MssqlDatabase {
    pub async fn connect(target: &SqlServerTarget) -> DbResult<Self> {
        let mut config = Config::new();
        config.host(&target.server);
        config.port(target.port);
        config.database(&target.database);
        config.application_name(APPLICATION_NAME);
        config.authentication(AuthMethod::aad_token(&target.token));
        if target.trust_cert {
            config.trust_cert();
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| DbError::Connection(format!("{}: {}", config.get_addr(), e)))?;
        tcp.set_nodelay(true)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        info!(
            server = %target.server,
            database = %target.database,
            "Connected to SQL Server"
        );
        Ok(Self { client })
    }

    async fn simple(&mut self, sql: &str) -> DbResult<()> {
        self.client
            .simple_query(sql)
            .await
            .map_err(from_tiberius)?
            .into_results()
            .await
            .map_err(from_tiberius)?;
        Ok(())
    }

    async fn insert_chunks(&mut self, plan: &InsertPlan, rows: &[Row]) -> DbResult<u64> {
        let prefix = format!(
            "INSERT INTO {} ({}) VALUES ",
            Dialect::SqlServer.quote_ident(&plan.table),
            plan.column_list(Dialect::SqlServer)
        );
        let cast_list: Vec<Option<CastRule>> = plan.columns.iter().map(|c| c.cast).collect();
        let casts = cast_list.as_slice();

        let mut inserted = 0;
        for chunk in rows.chunks(rows_per_statement(casts.len())) {
            let sql = format!("{}{}", prefix, values_clause(chunk.len(), casts.len()));

            let params: Vec<Param<'_>> = chunk
                .iter()
                .flat_map(move |row| {
                    casts.iter().enumerate().map(move |(idx, cast)| Param {
                        value: row.get(idx).and_then(Option::as_ref),
                        cast: *cast,
                    })
                })
                .collect();
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();

            let result = self.client.execute(sql, &refs).await.map_err(from_tiberius)?;
            inserted += result.total();
        }
        Ok(inserted)
    }
}

#[async_trait]
impl Database for MssqlDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let result = self.client.execute(sql, &[]).await.map_err(from_tiberius)?;
        Ok(result.total())
    }

    async fn insert_rows(&mut self, plan: &InsertPlan, rows: &[Row]) -> DbResult<u64> {
        if rows.is_empty() || plan.columns.is_empty() {
            return Ok(0);
        }

        self.simple("BEGIN TRANSACTION").await?;
        match self.insert_chunks(plan, rows).await {
            Ok(inserted) => {
                self.simple("COMMIT TRANSACTION").await?;
                Ok(inserted)
            },
            Err(e) => {
                if let Err(rollback) = self.simple("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await {
                    warn!(error = %rollback, "Rollback after failed insert did not complete");
                    if rollback.is_fatal() {
                        return Err(rollback);
                    }
                }
                Err(e)
            },
        }
    }

    async fn count_rows(&mut self, table: &str) -> DbResult<i64> {
        let sql = format!("SELECT COUNT_BIG(*) FROM {}", Dialect::SqlServer.quote_ident(table));
        let row = self
            .client
            .query(sql, &[])
            .await
            .map_err(from_tiberius)?
            .into_row()
            .await
            .map_err(from_tiberius)?
            .ok_or_else(|| DbError::Rejected("COUNT returned no row".to_string()))?;

        row.try_get::<i64, _>(0)
            .map_err(from_tiberius)?
            .ok_or_else(|| DbError::Rejected("COUNT returned NULL".to_string()))
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        debug!("Closing SQL Server connection");
        self.client
            .close()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))
    }
}

fn rows_per_statement(columns: usize) -> usize {
    (MAX_PARAMS_PER_STATEMENT / columns.max(1)).clamp(1, MAX_ROWS_PER_STATEMENT)
}

/// `(@P1, @P2), (@P3, @P4)` for `rows` rows of `columns` parameters
fn values_clause(rows: usize, columns: usize) -> String {
    (0..rows)
        .map(|r| {
            let params: Vec<String> = (1..=columns).map(|c| format!("@P{}", r * columns + c)).collect();
            format!("({})", params.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// A normalized value bound with the SQL type of its column
struct Param<'a> {
    value: Option<&'a SqlValue>,
    cast: Option<CastRule>,
}

impl ToSql for Param<'_> {
    fn to_sql(&self) -> ColumnData<'_> {
        match self.value {
            None => typed_null(self.cast),
            Some(SqlValue::Text(s)) => ColumnData::String(Some(Cow::Borrowed(s.as_str()))),
            Some(SqlValue::Int(i)) => ColumnData::I32(Some(*i)),
            Some(SqlValue::BigInt(i)) => ColumnData::I64(Some(*i)),
            Some(SqlValue::Float(f)) => ColumnData::F64(Some(*f)),
            Some(SqlValue::Decimal(d)) => decimal_to_sql(d),
            Some(SqlValue::Timestamp(t)) => t.to_sql(),
            Some(SqlValue::Uuid(u)) => ColumnData::Guid(Some(*u)),
        }
    }
}

fn typed_null(cast: Option<CastRule>) -> ColumnData<'static> {
    match cast {
        None => ColumnData::String(None),
        Some(CastRule::Int) => ColumnData::I32(None),
        Some(CastRule::BigInt) => ColumnData::I64(None),
        Some(CastRule::Float) => ColumnData::F64(None),
        Some(CastRule::Decimal { .. }) => ColumnData::Numeric(None),
        Some(CastRule::Timestamp) => ColumnData::DateTime2(None),
        Some(CastRule::Uuid) => ColumnData::Guid(None),
    }
}

/// Exact numeric when it fits the wire format, otherwise its text form
fn decimal_to_sql(value: &BigDecimal) -> ColumnData<'static> {
    let (digits, scale) = value.as_bigint_and_exponent();
    match (digits.to_i128(), u8::try_from(scale)) {
        (Some(digits), Ok(scale)) => ColumnData::Numeric(Some(Numeric::new_with_scale(digits, scale))),
        _ => ColumnData::String(Some(Cow::Owned(value.to_string()))),
    }
}

fn from_tiberius(err: tiberius::error::Error) -> DbError {
    use tiberius::error::Error;
    match &err {
        Error::Io { .. } | Error::Tls(_) | Error::Protocol(_) | Error::Routing { .. } => {
            DbError::Connection(err.to_string())
        },
        _ => DbError::Rejected(err.to_string()),
    }
}
