//! Per-table load metrics and incremental progress lines

use civicload_common::format::{format_count, format_elapsed, format_rate};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Sample row errors kept per table
pub const MAX_SAMPLE_ERRORS: usize = 5;

/// Outcome of loading one table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableLoadStats {
    pub attempted: u64,
    pub committed: u64,
    pub errored: u64,
    pub elapsed: Duration,
    /// The first few row error messages, for the end-of-table log
    pub sample_errors: Vec<String>,
}

impl TableLoadStats {
    /// Stats for a single server-side statement: every affected row counts as attempted and committed
    pub fn bulk(affected: u64, elapsed: Duration) -> Self {
        Self {
            attempted: affected,
            committed: affected,
            errored: 0,
            elapsed,
            sample_errors: Vec::new(),
        }
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errored += 1;
        if self.sample_errors.len() < MAX_SAMPLE_ERRORS {
            self.sample_errors.push(message.into());
        }
    }

    pub fn rate(&self) -> String {
        format_rate(self.committed, self.elapsed)
    }

    pub fn log_sample_errors(&self, table: &str) {
        if self.errored == 0 {
            return;
        }
        for (i, message) in self.sample_errors.iter().enumerate() {
            warn!(table, sample = i + 1, error = %message, "Row error");
        }
        let unsampled = self.errored.saturating_sub(self.sample_errors.len() as u64);
        if unsampled > 0 {
            warn!(table, "... and {} more row errors", format_count(unsampled));
        }
    }
}

/// Logs running totals after each batch
pub struct ProgressReporter {
    table: String,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn report(&self, stats: &TableLoadStats) {
        let elapsed = self.elapsed();
        info!(
            table = %self.table,
            committed = stats.committed,
            errors = stats.errored,
            "{}: {} rows ({}), {} errors, {}",
            self.table,
            format_count(stats.committed),
            format_rate(stats.committed, elapsed),
            format_count(stats.errored),
            format_elapsed(elapsed)
        );
    }
}
