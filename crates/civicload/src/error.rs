//! Error types for the loader
//!
//! Errors are classified by how far they propagate. Only [`LoaderError::is_fatal`]
//! errors stop a run; everything else is recorded against the table that
//! raised it and the orchestrator moves on.

use std::path::PathBuf;
use thiserror::Error;

use crate::db::DbError;
use crate::spec::RegistryError;

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

#[derive(Error, Debug)]
pub enum LoaderError {
    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables.")]
    Config(String),

    /// A table specification failed registration
    #[error("Invalid table specification: {0}")]
    Registry(#[from] RegistryError),

    /// Could not obtain or lost the database connection
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// The credential or external data source could not be (re)created
    #[error("Failed to establish external data source '{name}': {reason}")]
    ExternalSource { name: String, reason: String },

    /// The local source file for a table does not exist
    #[error("Source file not found: '{}'", .0.display())]
    SourceMissing(PathBuf),

    /// None of the mapped ordinals fall inside the file's header
    #[error("{table}: none of the mapped columns exist in a {width}-column header")]
    NoMappedColumns { table: String, width: usize },

    /// The strategy cannot run against this database
    #[error("Strategy '{strategy}' is not supported on {dialect}")]
    UnsupportedStrategy { strategy: String, dialect: String },

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl LoaderError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Fatal errors abort the whole run; the rest fail a single table
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Connection(_) | Self::ExternalSource { .. } => true,
            Self::Database(e) => e.is_fatal(),
            _ => false,
        }
    }
}
