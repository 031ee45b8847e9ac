//! Civicload Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Schema-driven bulk loader for property, licensing and violation extracts.
//!
//! # Overview
//!
//! - **Table specifications**: validated, ordered mappings from CSV positions
//!   to typed target columns ([`spec`])
//! - **Value normalization**: trim, empty-to-null, length bound and safe casts
//!   ([`normalize`])
//! - **Bulk path**: one server-side `OPENROWSET` statement per table, reading
//!   from blob storage ([`bulk`])
//! - **Batch path**: streamed local CSV with batched inserts and row-level
//!   fallback ([`batch`])
//! - **Orchestration**: table ordering, failure isolation, verification counts
//!   ([`orchestrator`])

pub mod batch;
pub mod bulk;
pub mod config;
pub mod db;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod spec;

pub use config::{LoaderConfig, StrategyKind};
pub use error::{LoaderError, Result};
pub use orchestrator::{LoadOrchestrator, LoadStrategy, RunSummary};

use clap::Parser;
use std::path::PathBuf;

/// Civicload - bulk CSV loader for civic datasets
#[derive(Parser, Debug)]
#[command(name = "civicload")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Load strategy: `batch` (local files) or `bulk` (server-side from blob storage)
    #[arg(short, long, env = "LOAD_STRATEGY")]
    pub strategy: Option<String>,

    /// Comma-separated tables to load (default: all, in dependency order)
    #[arg(short, long, env = "LOAD_TABLES", value_delimiter = ',')]
    pub tables: Vec<String>,

    /// Directory containing the source CSV files
    #[arg(short, long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Rows per multi-row insert
    #[arg(short, long, env = "LOAD_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Apply command-line values on top of the environment configuration
    pub fn apply(&self, mut config: LoaderConfig) -> Result<LoaderConfig> {
        if let Some(ref strategy) = self.strategy {
            config.strategy = strategy.parse()?;
        }
        let tables: Vec<String> = self
            .tables
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if !tables.is_empty() {
            config.tables = tables;
        }
        if let Some(ref dir) = self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        config.validate()?;
        Ok(config)
    }
}
