//! External data source bootstrap
//!
//! The bulk path reads source files straight from blob storage through a
//! named external data source backed by a database scoped credential. The
//! SAS token in that credential expires between runs and the data source
//! cannot be altered while it references the credential, so every run tears
//! both down and recreates them.

use std::fmt;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::LoaderError;

/// Blob storage pointer settings
#[derive(Clone)]
pub struct ExternalSourceConfig {
    pub data_source_name: String,
    pub credential_name: String,
    /// Container URL, e.g. `https://account.blob.core.windows.net/container`
    pub location: String,
    pub sas_token: String,
    /// Creates the database master key first when set
    pub master_key_password: Option<String>,
}

impl fmt::Debug for ExternalSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalSourceConfig")
            .field("data_source_name", &self.data_source_name)
            .field("credential_name", &self.credential_name)
            .field("location", &self.location)
            .field("sas_token", &"<redacted>")
            .field(
                "master_key_password",
                &self.master_key_password.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

pub struct ExternalSourceBootstrapper {
    config: ExternalSourceConfig,
}

impl ExternalSourceBootstrapper {
    pub fn new(config: ExternalSourceConfig) -> Self {
        Self { config }
    }

    pub fn data_source_name(&self) -> &str {
        &self.config.data_source_name
    }

    /// Recreate the credential and data source with the current token.
    ///
    /// Teardown failures mean the objects were not there and are ignored.
    /// Any failure while creating them is fatal.
    pub async fn bootstrap(&self, db: &mut dyn Database) -> Result<(), LoaderError> {
        let cfg = &self.config;

        if let Some(ref password) = cfg.master_key_password {
            let sql = format!(
                "CREATE MASTER KEY ENCRYPTION BY PASSWORD = '{}'",
                escape_literal(password)
            );
            if let Err(e) = db.execute(&sql).await {
                if e.is_fatal() {
                    return Err(e.into());
                }
                debug!(error = %e, "Master key not created, assuming it exists");
            }
        }

        // The data source references the credential, so it goes first
        let teardown = [
            format!("DROP EXTERNAL DATA SOURCE {}", cfg.data_source_name),
            format!("DROP DATABASE SCOPED CREDENTIAL {}", cfg.credential_name),
        ];
        for sql in &teardown {
            if let Err(e) = db.execute(sql).await {
                if e.is_fatal() {
                    return Err(e.into());
                }
                debug!(statement = %sql, error = %e, "Teardown skipped");
            }
        }

        let create_credential = format!(
            "CREATE DATABASE SCOPED CREDENTIAL {} WITH IDENTITY = 'SHARED ACCESS SIGNATURE', SECRET = '{}'",
            cfg.credential_name,
            escape_literal(sas_secret(&cfg.sas_token))
        );
        let create_source = format!(
            "CREATE EXTERNAL DATA SOURCE {} WITH (TYPE = BLOB_STORAGE, LOCATION = '{}', CREDENTIAL = {})",
            cfg.data_source_name,
            escape_literal(&cfg.location),
            cfg.credential_name
        );
        for sql in [create_credential, create_source] {
            db.execute(&sql)
                .await
                .map_err(|e| LoaderError::ExternalSource {
                    name: cfg.data_source_name.clone(),
                    reason: e.to_string(),
                })?;
        }

        info!(
            data_source = %cfg.data_source_name,
            location = %cfg.location,
            "External data source configured"
        );
        Ok(())
    }
}

/// SAS tokens are often copied with their leading `?`; the credential wants it without
fn sas_secret(token: &str) -> &str {
    token.strip_prefix('?').unwrap_or(token)
}

/// Double single quotes for use inside a T-SQL string literal
pub(crate) fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
