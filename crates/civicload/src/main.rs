//! Civicload - Main entry point

use anyhow::{Context, Result};
use civicload::bulk::{BulkImportStrategy, ExternalSourceBootstrapper};
use civicload::batch::BatchInsertLoader;
use civicload::spec::Registry;
use civicload::{db, Cli, LoadOrchestrator, LoaderConfig, LoaderError, StrategyKind};
use civicload_common::logging::{init_logging, LogConfig, LogLevel};
use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("civicload")
        .filter_directives("sqlx=warn,tiberius=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _log_guard = init_logging(&log_config)?;

    // Validated once, after command-line overrides
    let config = cli.apply(LoaderConfig::read_env()?)?;
    info!(
        strategy = %config.strategy,
        backend = ?config.target.backend(),
        data_dir = %config.data_dir.display(),
        "Starting civicload"
    );

    let registry = Registry::builtin().context("built-in dataset catalog is invalid")?;
    let specs = if config.tables.is_empty() {
        registry.iter().cloned().collect()
    } else {
        registry
            .select(&config.tables)
            .map_err(LoaderError::from)?
            .into_iter()
            .cloned()
            .collect()
    };

    let orchestrator = match config.strategy {
        StrategyKind::Batch => LoadOrchestrator::new(
            specs,
            BatchInsertLoader::new(&config.data_dir)
                .with_batch_size(config.batch_size)
                .with_max_field_len(config.max_field_len),
        ),
        StrategyKind::Bulk => {
            let external = config
                .external_source
                .clone()
                .ok_or_else(|| LoaderError::config("the bulk strategy requires BLOB_LOCATION and SAS_TOKEN"))?;
            LoadOrchestrator::new(specs, BulkImportStrategy::open_rowset(&external.data_source_name))
                .with_bootstrapper(ExternalSourceBootstrapper::new(external))
        },
    };

    let connection = db::connect(&config.target)
        .await
        .map_err(|e| LoaderError::Connection(e.to_string()))?;

    let summary = orchestrator.run(connection).await?;
    info!(
        failed_tables = summary.failed().count(),
        "Done"
    );

    Ok(())
}
