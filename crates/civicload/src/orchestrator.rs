//! Load orchestration
//!
//! One run owns one connection. Tables load strictly in order, each moving
//! `Pending -> Loading -> Completed | Failed`. A table failure is recorded
//! and the run moves on; only a fatal error (lost connection, external
//! source setup) stops it. The connection is closed on every exit path.

use async_trait::async_trait;
use civicload_common::format::{format_count, format_elapsed};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::batch::TableLoadStats;
use crate::bulk::ExternalSourceBootstrapper;
use crate::db::{Database, Dialect};
use crate::error::LoaderError;
use crate::spec::TableSpec;

/// A way of getting one table's source rows into its target
#[async_trait]
pub trait LoadStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the external data source must exist before any table loads
    fn requires_external_source(&self) -> bool;

    fn supports(&self, dialect: Dialect) -> bool;

    async fn load_table(
        &self,
        db: &mut dyn Database,
        spec: &TableSpec,
    ) -> Result<TableLoadStats, LoaderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableState {
    Pending,
    Loading,
    Completed(TableLoadStats),
    Failed(String),
}

impl TableState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TableState::Completed(_) | TableState::Failed(_))
    }
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableState::Pending => f.write_str("pending"),
            TableState::Loading => f.write_str("loading"),
            TableState::Completed(_) => f.write_str("completed"),
            TableState::Failed(_) => f.write_str("failed"),
        }
    }
}

/// Result of one table within a run
#[derive(Debug, Clone, PartialEq)]
pub struct TableReport {
    pub table: String,
    pub state: TableState,
    /// Row count after the run; `None` when the count query failed
    pub final_count: Option<i64>,
}

impl TableReport {
    pub fn stats(&self) -> Option<&TableLoadStats> {
        match &self.state {
            TableState::Completed(stats) => Some(stats),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub tables: Vec<TableReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn get(&self, table: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == table)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TableReport> {
        self.tables
            .iter()
            .filter(|t| matches!(t.state, TableState::Failed(_)))
    }

    pub fn total_committed(&self) -> u64 {
        self.tables.iter().filter_map(|t| t.stats()).map(|s| s.committed).sum()
    }

    pub fn total_errored(&self) -> u64 {
        self.tables.iter().filter_map(|t| t.stats()).map(|s| s.errored).sum()
    }

    /// Final per-table count lines
    pub fn log_report(&self) {
        info!("Completed in {}", format_elapsed(self.elapsed));
        info!("Row counts:");
        for report in &self.tables {
            let count = report
                .final_count
                .and_then(|c| u64::try_from(c).ok())
                .map(format_count)
                .unwrap_or_else(|| "unavailable".to_string());
            match &report.state {
                TableState::Completed(stats) => info!(
                    "  {:<40} {:>12}  (+{} loaded, {} errors)",
                    report.table,
                    count,
                    format_count(stats.committed),
                    format_count(stats.errored)
                ),
                TableState::Failed(reason) => {
                    warn!("  {:<40} {:>12}  FAILED: {}", report.table, count, reason)
                },
                other => warn!("  {:<40} {:>12}  {}", report.table, count, other),
            }
        }
        info!(
            committed = self.total_committed(),
            errored = self.total_errored(),
            failed_tables = self.failed().count(),
            "Loaded {} rows with {} row errors",
            format_count(self.total_committed()),
            format_count(self.total_errored())
        );
    }
}

pub struct LoadOrchestrator {
    specs: Vec<TableSpec>,
    strategy: Box<dyn LoadStrategy>,
    bootstrapper: Option<ExternalSourceBootstrapper>,
}

impl LoadOrchestrator {
    /// `specs` load in the given order
    pub fn new(specs: Vec<TableSpec>, strategy: impl LoadStrategy + 'static) -> Self {
        Self {
            specs,
            strategy: Box::new(strategy),
            bootstrapper: None,
        }
    }

    pub fn with_bootstrapper(mut self, bootstrapper: ExternalSourceBootstrapper) -> Self {
        self.bootstrapper = Some(bootstrapper);
        self
    }

    /// Load every table over `db`, then close it whatever the outcome
    pub async fn run(&self, mut db: Box<dyn Database>) -> Result<RunSummary, LoaderError> {
        let result = self.run_with(db.as_mut()).await;

        if let Err(e) = db.close().await {
            warn!(error = %e, "Failed to close database connection");
        }

        match result {
            Ok(summary) => {
                summary.log_report();
                Ok(summary)
            },
            Err(e) => {
                error!(error = %e, "Load aborted");
                Err(e)
            },
        }
    }

    async fn run_with(&self, db: &mut dyn Database) -> Result<RunSummary, LoaderError> {
        let started = Instant::now();
        let dialect = db.dialect();

        if !self.strategy.supports(dialect) {
            return Err(LoaderError::UnsupportedStrategy {
                strategy: self.strategy.name().to_string(),
                dialect: dialect.to_string(),
            });
        }

        if self.strategy.requires_external_source() {
            let bootstrapper = self.bootstrapper.as_ref().ok_or_else(|| {
                LoaderError::config(format!(
                    "the {} strategy needs an external data source",
                    self.strategy.name()
                ))
            })?;
            bootstrapper.bootstrap(db).await?;
        }

        let mut reports: Vec<TableReport> = self
            .specs
            .iter()
            .map(|spec| TableReport {
                table: spec.target_table.clone(),
                state: TableState::Pending,
                final_count: None,
            })
            .collect();

        info!(
            strategy = self.strategy.name(),
            tables = self.specs.len(),
            "Starting load of {} tables",
            self.specs.len()
        );

        for (spec, report) in self.specs.iter().zip(reports.iter_mut()) {
            report.state = TableState::Loading;
            let table_started = Instant::now();

            report.state = match self.strategy.load_table(db, spec).await {
                Ok(stats) => TableState::Completed(stats),
                Err(e) if e.is_fatal() => {
                    error!(table = %spec.target_table, error = %e, "Fatal error, aborting run");
                    return Err(e);
                },
                Err(e) => {
                    error!(
                        table = %spec.target_table,
                        elapsed = %format_elapsed(table_started.elapsed()),
                        error = %e,
                        "{}: failed",
                        spec.target_table
                    );
                    TableState::Failed(e.to_string())
                },
            };
        }

        for report in reports.iter_mut() {
            report.final_count = match db.count_rows(&report.table).await {
                Ok(count) => Some(count),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(table = %report.table, error = %e, "Row count unavailable");
                    None
                },
            };
        }

        Ok(RunSummary {
            tables: reports,
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TableState::Pending.is_terminal());
        assert!(!TableState::Loading.is_terminal());
        assert!(TableState::Completed(TableLoadStats::default()).is_terminal());
        assert!(TableState::Failed("boom".into()).is_terminal());
    }

    #[test]
    fn test_summary_totals() {
        let completed = |committed: u64, errored: u64| TableState::Completed(TableLoadStats {
            attempted: committed + errored,
            committed,
            errored,
            ..Default::default()
        });
        let summary = RunSummary {
            tables: vec![
                TableReport {
                    table: "a".into(),
                    state: completed(10, 1),
                    final_count: Some(10),
                },
                TableReport {
                    table: "b".into(),
                    state: TableState::Failed("missing".into()),
                    final_count: None,
                },
                TableReport {
                    table: "c".into(),
                    state: completed(5, 0),
                    final_count: Some(5),
                },
            ],
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(summary.total_committed(), 15);
        assert_eq!(summary.total_errored(), 1);
        assert_eq!(summary.failed().count(), 1);
        assert_eq!(summary.get("c").and_then(|t| t.final_count), Some(5));
    }
}
