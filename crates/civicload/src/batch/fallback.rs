//! Two-tier batch writer
//!
//! A batch is first sent as one multi-row insert. If the server rejects it,
//! the same rows are retried one at a time and only the rows that fail on
//! their own are dropped. A lost connection is never degraded; it propagates.

use tracing::debug;

use crate::db::{Database, DbError, InsertPlan};
use crate::normalize::Row;

/// Result of writing one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub committed: u64,
    pub errored: u64,
    /// Messages of the rows that failed individually, in batch order
    pub errors: Vec<String>,
    /// Whether the per-row fallback ran
    pub degraded: bool,
}

pub struct FallbackWriter<'a> {
    plan: &'a InsertPlan,
}

impl<'a> FallbackWriter<'a> {
    pub fn new(plan: &'a InsertPlan) -> Self {
        Self { plan }
    }

    pub fn table(&self) -> &str {
        &self.plan.table
    }

    /// Write `rows`; only connection-level errors are returned
    pub async fn write(&self, db: &mut dyn Database, rows: &[Row]) -> Result<BatchOutcome, DbError> {
        if rows.is_empty() {
            return Ok(BatchOutcome::default());
        }

        match db.insert_rows(self.plan, rows).await {
            Ok(_) => {
                return Ok(BatchOutcome {
                    committed: rows.len() as u64,
                    ..Default::default()
                })
            },
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!(
                    table = %self.plan.table,
                    rows = rows.len(),
                    error = %e,
                    "Batch insert rejected, retrying row by row"
                );
            },
        }

        let mut outcome = BatchOutcome {
            degraded: true,
            ..Default::default()
        };
        for row in rows {
            match db.insert_rows(self.plan, std::slice::from_ref(row)).await {
                Ok(_) => outcome.committed += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    outcome.errored += 1;
                    outcome.errors.push(e.to_string());
                },
            }
        }
        Ok(outcome)
    }
}
