//! Client-side batch insert loader
//!
//! Streams a local CSV file, maps columns by position, normalizes every
//! mapped field and inserts in fixed-size batches. Nothing short of a lost
//! connection or an unreadable file stops a table:
//!
//! - a record with the wrong number of fields is counted as a row error
//! - a rejected batch is retried row by row ([`FallbackWriter`])
//! - a row the target rejects on its own is dropped and counted
//!
//! There is no primary-key filter here. Rows with an empty key are sent to
//! the target like any other row; the bulk path is the one that filters.

pub mod fallback;
pub mod stats;

use async_trait::async_trait;
use csv::{ByteRecord, ReaderBuilder};
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::DEFAULT_BATCH_SIZE;
use crate::db::{Database, Dialect, InsertColumn, InsertPlan};
use crate::error::LoaderError;
use crate::normalize::{normalize_value, Row, DEFAULT_MAX_FIELD_LEN};
use crate::orchestrator::LoadStrategy;
use crate::spec::{CastRule, TableSpec};

pub use fallback::{BatchOutcome, FallbackWriter};
pub use stats::{ProgressReporter, TableLoadStats, MAX_SAMPLE_ERRORS};

/// Source columns resolved against an actual header
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    /// 0-based field index for each insert column
    pub indices: Vec<usize>,
    pub insert: InsertPlan,
}

impl ColumnPlan {
    /// Keep the mapped columns whose ordinal falls inside a header of `width` fields
    pub fn resolve(spec: &TableSpec, width: usize) -> Result<Self, LoaderError> {
        let mut indices = Vec::new();
        let mut columns = Vec::new();

        for column in spec.mapped_columns() {
            let index = column.ordinal - 1;
            if index >= width {
                warn!(
                    table = %spec.target_table,
                    column = column.name,
                    ordinal = column.ordinal,
                    width,
                    "Column beyond end of header, skipping"
                );
                continue;
            }
            indices.push(index);
            columns.push(InsertColumn {
                name: column.name.to_string(),
                cast: column.cast,
            });
        }

        if columns.is_empty() {
            return Err(LoaderError::NoMappedColumns {
                table: spec.target_table.clone(),
                width,
            });
        }

        Ok(Self {
            indices,
            insert: InsertPlan::new(spec.target_table.clone(), columns),
        })
    }

    fn casts(&self) -> impl Iterator<Item = Option<CastRule>> + '_ {
        self.insert.columns.iter().map(|c| c.cast)
    }
}

/// Loads local CSV files in batches with row-level fallback
#[derive(Debug, Clone)]
pub struct BatchInsertLoader {
    data_dir: PathBuf,
    batch_size: usize,
    max_field_len: usize,
}

impl BatchInsertLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_field_len(mut self, max_field_len: usize) -> Self {
        self.max_field_len = max_field_len.max(1);
        self
    }

    pub fn source_path(&self, spec: &TableSpec) -> PathBuf {
        self.data_dir.join(&spec.source_id)
    }

    /// Load `spec` from an already opened CSV stream (header row first)
    pub async fn load<R>(
        &self,
        db: &mut dyn Database,
        spec: &TableSpec,
        input: R,
    ) -> Result<TableLoadStats, LoaderError>
    where
        R: Read + Send,
    {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(input);

        let width = reader.byte_headers()?.len();
        let plan = ColumnPlan::resolve(spec, width)?;
        let writer = FallbackWriter::new(&plan.insert);
        let progress = ProgressReporter::new(&spec.target_table);

        info!(
            table = %spec.target_table,
            columns = plan.indices.len(),
            batch_size = self.batch_size,
            "Loading {} ({} of {} mapped columns present)",
            spec.target_table,
            plan.indices.len(),
            spec.mapped_columns().count()
        );

        let mut stats = TableLoadStats::default();
        let mut batch: Vec<Row> = Vec::with_capacity(self.batch_size);
        let mut record = ByteRecord::new();

        loop {
            match reader.read_byte_record(&mut record) {
                Ok(false) => break,
                Ok(true) => {
                    stats.attempted += 1;
                    batch.push(self.normalize_record(&record, &plan));
                },
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    stats.attempted += 1;
                    let line = e.position().map(|p| p.line()).unwrap_or_default();
                    stats.record_error(format!("line {}: {}", line, e));
                },
            }

            if batch.len() >= self.batch_size {
                self.flush(db, &writer, &mut batch, &mut stats).await?;
                progress.report(&stats);
            }
        }

        if !batch.is_empty() {
            self.flush(db, &writer, &mut batch, &mut stats).await?;
        }
        progress.report(&stats);

        stats.elapsed = progress.elapsed();
        stats.log_sample_errors(&spec.target_table);
        Ok(stats)
    }

    fn normalize_record(&self, record: &ByteRecord, plan: &ColumnPlan) -> Row {
        plan.indices
            .iter()
            .zip(plan.casts())
            .map(|(&index, cast)| {
                let raw = String::from_utf8_lossy(record.get(index)?);
                normalize_value(&raw, cast, self.max_field_len)
            })
            .collect()
    }

    async fn flush(
        &self,
        db: &mut dyn Database,
        writer: &FallbackWriter<'_>,
        batch: &mut Vec<Row>,
        stats: &mut TableLoadStats,
    ) -> Result<(), LoaderError> {
        let outcome = writer.write(db, batch).await?;
        if outcome.degraded {
            warn!(
                table = %writer.table(),
                rows = batch.len(),
                committed = outcome.committed,
                errored = outcome.errored,
                "Batch rejected, fell back to row-by-row inserts"
            );
        }

        stats.committed += outcome.committed;
        for message in outcome.errors {
            stats.record_error(message);
        }
        batch.clear();
        Ok(())
    }
}

#[async_trait]
impl LoadStrategy for BatchInsertLoader {
    fn name(&self) -> &'static str {
        "batch"
    }

    fn requires_external_source(&self) -> bool {
        false
    }

    fn supports(&self, _dialect: Dialect) -> bool {
        true
    }

    async fn load_table(
        &self,
        db: &mut dyn Database,
        spec: &TableSpec,
    ) -> Result<TableLoadStats, LoaderError> {
        let path = self.source_path(spec);
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LoaderError::SourceMissing(path.clone()),
            _ => LoaderError::Io(e),
        })?;
        self.load(db, spec, file).await
    }
}
