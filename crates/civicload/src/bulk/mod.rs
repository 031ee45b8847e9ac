//! Server-side bulk import
//!
//! The whole table is loaded by one statement the database executes on its
//! own: it reads the source file from blob storage, trims and casts every
//! column and inserts the projection. Casts that fail yield NULL; a statement
//! that fails aborts the table and commits nothing.

pub mod external_source;

use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info};

use crate::batch::TableLoadStats;
use crate::db::{Database, Dialect};
use crate::error::LoaderError;
use crate::orchestrator::LoadStrategy;
use crate::spec::{CastRule, MappedColumn, ReadType, TableSpec};

pub use external_source::{ExternalSourceBootstrapper, ExternalSourceConfig};

/// Builds the single import-and-cast statement for a table.
///
/// The bind, trim, cast and filter logic is the same for every engine; only
/// the emitted text differs between implementations.
pub trait BulkQueryBuilder: Send + Sync {
    fn build(&self, spec: &TableSpec) -> String;
}

/// T-SQL `INSERT .. SELECT .. FROM OPENROWSET(BULK ..)` against an external data source
#[derive(Debug, Clone)]
pub struct OpenRowsetQueryBuilder {
    data_source: String,
}

impl OpenRowsetQueryBuilder {
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
        }
    }

    fn alias(column: &MappedColumn<'_>) -> String {
        Dialect::SqlServer.quote_ident(&format!("c_{}", column.name))
    }

    /// Trimmed, empty-to-NULL and cast expression for one staging alias
    fn value_expr(column: &MappedColumn<'_>) -> String {
        let cleaned = format!("NULLIF(LTRIM(RTRIM({})), '')", Self::alias(column));
        match column.cast {
            Some(rule) => format!("TRY_CAST({} AS {})", cleaned, sql_type(rule)),
            None => cleaned,
        }
    }
}

impl BulkQueryBuilder for OpenRowsetQueryBuilder {
    fn build(&self, spec: &TableSpec) -> String {
        let columns: Vec<MappedColumn<'_>> = spec.mapped_columns().collect();

        let target_columns = columns
            .iter()
            .map(|c| Dialect::SqlServer.quote_ident(c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let select_list = columns
            .iter()
            .map(|c| format!("        {}", Self::value_expr(c)))
            .collect::<Vec<_>>()
            .join(",\n");
        let with_list = columns
            .iter()
            .map(|c| format!("        {} {} {}", Self::alias(c), read_type(c.read_type), c.ordinal))
            .collect::<Vec<_>>()
            .join(",\n");
        let pk_filter = spec
            .primary_key_column()
            .map(|pk| format!("\n    WHERE {} IS NOT NULL", Self::value_expr(&pk)))
            .unwrap_or_default();

        format!(
            "INSERT INTO {table} ({target_columns})
    SELECT
{select_list}
    FROM OPENROWSET(
        BULK '{source}',
        DATA_SOURCE = '{data_source}',
        FORMAT = 'CSV',
        FIRSTROW = 2,
        FIELDQUOTE = '\"'
    ) WITH (
{with_list}
    ) AS r{pk_filter}",
            table = Dialect::SqlServer.quote_ident(&spec.target_table),
            source = external_source::escape_literal(&spec.source_id),
            data_source = external_source::escape_literal(&self.data_source),
        )
    }
}

fn sql_type(rule: CastRule) -> String {
    match rule {
        CastRule::Int => "INT".to_string(),
        CastRule::BigInt => "BIGINT".to_string(),
        CastRule::Float => "FLOAT".to_string(),
        CastRule::Decimal { precision, scale } => format!("DECIMAL({},{})", precision, scale),
        CastRule::Timestamp => "DATETIME2".to_string(),
        CastRule::Uuid => "UNIQUEIDENTIFIER".to_string(),
    }
}

fn read_type(read: ReadType) -> String {
    match read {
        ReadType::Text(width) => format!("NVARCHAR({})", width),
        ReadType::TextMax => "NVARCHAR(MAX)".to_string(),
    }
}

/// Loads each table with one server-executed statement
pub struct BulkImportStrategy {
    builder: Box<dyn BulkQueryBuilder>,
}

impl BulkImportStrategy {
    pub fn new(builder: impl BulkQueryBuilder + 'static) -> Self {
        Self {
            builder: Box::new(builder),
        }
    }

    pub fn open_rowset(data_source: impl Into<String>) -> Self {
        Self::new(OpenRowsetQueryBuilder::new(data_source))
    }
}

#[async_trait]
impl LoadStrategy for BulkImportStrategy {
    fn name(&self) -> &'static str {
        "bulk"
    }

    fn requires_external_source(&self) -> bool {
        true
    }

    fn supports(&self, dialect: Dialect) -> bool {
        dialect == Dialect::SqlServer
    }

    async fn load_table(
        &self,
        db: &mut dyn Database,
        spec: &TableSpec,
    ) -> Result<TableLoadStats, LoaderError> {
        let started = Instant::now();
        let sql = self.builder.build(spec);
        debug!(table = %spec.target_table, sql = %sql, "Bulk import statement");

        info!(table = %spec.target_table, source = %spec.source_id, "Bulk importing {}", spec.target_table);
        let affected = db.execute(&sql).await?;

        let stats = TableLoadStats::bulk(affected, started.elapsed());
        info!(
            table = %spec.target_table,
            rows = stats.committed,
            "{}: {} rows imported ({})",
            spec.target_table,
            civicload_common::format::format_count(stats.committed),
            stats.rate()
        );
        Ok(stats)
    }
}
