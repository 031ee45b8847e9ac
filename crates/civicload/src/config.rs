//! Configuration management
//!
//! Everything is read from the environment (after loading `.env` when
//! present). Tokens are opaque strings; they are never logged.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::bulk::ExternalSourceConfig;
use crate::error::LoaderError;
use crate::normalize::DEFAULT_MAX_FIELD_LEN;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/civicload";

/// Default SQL Server port.
pub const DEFAULT_DB_PORT: u16 = 1433;

/// Default directory holding the source CSV files.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default number of rows per multi-row insert.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Default name of the external data source pointing at blob storage.
pub const DEFAULT_EXTERNAL_DATA_SOURCE: &str = "CsvBlobStorage";

/// Default name of the database scoped credential holding the SAS token.
pub const DEFAULT_EXTERNAL_CREDENTIAL: &str = "BlobSasCredential";

/// Database engine to load into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Mssql,
}

impl FromStr for Backend {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Backend::Postgres),
            "mssql" | "sqlserver" | "azuresql" => Ok(Backend::Mssql),
            other => Err(LoaderError::config(format!(
                "unknown DATABASE_BACKEND '{}', expected 'postgres' or 'mssql'",
                other
            ))),
        }
    }
}

/// Which load strategy runs for every table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Stream local files and insert in batches with row-level fallback
    Batch,
    /// One server-side OPENROWSET statement per table
    Bulk,
}

impl FromStr for StrategyKind {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "batch" => Ok(StrategyKind::Batch),
            "bulk" => Ok(StrategyKind::Bulk),
            other => Err(LoaderError::config(format!(
                "unknown load strategy '{}', expected 'batch' or 'bulk'",
                other
            ))),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Batch => f.write_str("batch"),
            StrategyKind::Bulk => f.write_str("bulk"),
        }
    }
}

/// SQL Server connection target
#[derive(Clone)]
pub struct SqlServerTarget {
    pub server: String,
    pub database: String,
    pub port: u16,
    /// Azure AD access token
    pub token: String,
    pub trust_cert: bool,
}

impl fmt::Debug for SqlServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlServerTarget")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("port", &self.port)
            .field("token", &"<redacted>")
            .field("trust_cert", &self.trust_cert)
            .finish()
    }
}

/// Where the single run connection goes
#[derive(Clone)]
pub enum DatabaseTarget {
    Postgres { url: String, token: Option<String> },
    SqlServer(SqlServerTarget),
}

impl DatabaseTarget {
    pub fn backend(&self) -> Backend {
        match self {
            DatabaseTarget::Postgres { .. } => Backend::Postgres,
            DatabaseTarget::SqlServer(_) => Backend::Mssql,
        }
    }
}

impl fmt::Debug for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseTarget::Postgres { url, token } => f
                .debug_struct("Postgres")
                .field("url", &redact_url(url))
                .field("token", &token.as_ref().map(|_| "<redacted>"))
                .finish(),
            DatabaseTarget::SqlServer(target) => target.fmt(f),
        }
    }
}

/// Loader configuration
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub target: DatabaseTarget,
    pub strategy: StrategyKind,
    pub data_dir: PathBuf,
    pub batch_size: usize,
    pub max_field_len: usize,
    /// Restrict the run to these tables; empty loads every registered table
    pub tables: Vec<String>,
    /// Blob storage pointer for the bulk strategy
    pub external_source: Option<ExternalSourceConfig>,
}

impl LoaderConfig {
    /// Load configuration from `.env`, the environment and defaults
    pub fn from_env() -> Result<Self, LoaderError> {
        let config = Self::read_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`LoaderConfig::from_env`] but without validation, for callers
    /// that layer further overrides on top before validating
    pub fn read_env() -> Result<Self, LoaderError> {
        dotenvy::dotenv().ok();
        Self::read_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source and validate
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LoaderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::read_lookup(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse every variable; values are checked for syntax only
    pub fn read_lookup<F>(lookup: F) -> Result<Self, LoaderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend = match var("DATABASE_BACKEND") {
            Some(value) => value.parse()?,
            None => Backend::Postgres,
        };

        let target = match backend {
            Backend::Postgres => DatabaseTarget::Postgres {
                url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
                token: var("DB_TOKEN"),
            },
            Backend::Mssql => DatabaseTarget::SqlServer(SqlServerTarget {
                server: var("DB_SERVER").unwrap_or_default(),
                database: var("DB_NAME").unwrap_or_default(),
                port: parse_number("DB_PORT", var("DB_PORT"))?.unwrap_or(DEFAULT_DB_PORT),
                token: var("DB_TOKEN").unwrap_or_default(),
                trust_cert: var("DB_TRUST_CERT")
                    .map(|s| parse_bool(&s))
                    .unwrap_or(false),
            }),
        };

        let strategy = match var("LOAD_STRATEGY") {
            Some(value) => value.parse()?,
            None => StrategyKind::Batch,
        };

        let external_source = match (var("BLOB_LOCATION"), var("SAS_TOKEN")) {
            (Some(location), Some(sas_token)) => Some(ExternalSourceConfig {
                data_source_name: var("EXTERNAL_DATA_SOURCE")
                    .unwrap_or_else(|| DEFAULT_EXTERNAL_DATA_SOURCE.to_string()),
                credential_name: var("EXTERNAL_CREDENTIAL")
                    .unwrap_or_else(|| DEFAULT_EXTERNAL_CREDENTIAL.to_string()),
                location,
                sas_token,
                master_key_password: var("MASTER_KEY_PASSWORD"),
            }),
            _ => None,
        };

        let config = LoaderConfig {
            target,
            strategy,
            data_dir: var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            batch_size: parse_number("LOAD_BATCH_SIZE", var("LOAD_BATCH_SIZE"))?
                .unwrap_or(DEFAULT_BATCH_SIZE),
            max_field_len: parse_number("LOAD_MAX_FIELD_LEN", var("LOAD_MAX_FIELD_LEN"))?
                .unwrap_or(DEFAULT_MAX_FIELD_LEN),
            tables: var("LOAD_TABLES").map(|s| split_list(&s)).unwrap_or_default(),
            external_source,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), LoaderError> {
        if self.batch_size == 0 {
            return Err(LoaderError::config("LOAD_BATCH_SIZE must be greater than 0"));
        }
        if self.max_field_len == 0 {
            return Err(LoaderError::config("LOAD_MAX_FIELD_LEN must be greater than 0"));
        }

        match &self.target {
            DatabaseTarget::Postgres { url, .. } => {
                if url.is_empty() {
                    return Err(LoaderError::config("DATABASE_URL cannot be empty"));
                }
            },
            DatabaseTarget::SqlServer(target) => {
                if target.server.is_empty() || target.database.is_empty() {
                    return Err(LoaderError::config(
                        "DB_SERVER and DB_NAME are required for the mssql backend",
                    ));
                }
                if target.token.is_empty() {
                    return Err(LoaderError::config("DB_TOKEN is required for the mssql backend"));
                }
            },
        }

        if self.strategy == StrategyKind::Bulk {
            if self.target.backend() != Backend::Mssql {
                return Err(LoaderError::config(
                    "the bulk strategy reads from blob storage and requires DATABASE_BACKEND=mssql",
                ));
            }
            if self.external_source.is_none() {
                return Err(LoaderError::config(
                    "the bulk strategy requires BLOB_LOCATION and SAS_TOKEN",
                ));
            }
        }

        Ok(())
    }
}

/// Split a comma-separated list, dropping blanks
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_number<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, LoaderError> {
    value
        .map(|v| {
            v.parse()
                .map_err(|_| LoaderError::config(format!("{} must be a non-negative integer, got '{}'", key, v)))
        })
        .transpose()
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Hide the password component of a connection URL
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let userinfo = &url[scheme_end + 3..at];
            match userinfo.find(':') {
                Some(colon) => format!(
                    "{}{}:<redacted>{}",
                    &url[..scheme_end + 3],
                    &userinfo[..colon],
                    &url[at..]
                ),
                None => url.to_string(),
            }
        },
        _ => url.to_string(),
    }
}
