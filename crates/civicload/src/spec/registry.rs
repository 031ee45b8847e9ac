//! Validated, ordered collection of table specifications
//!
//! Registration is the only place specs are checked. Once a [`Registry`]
//! exists, every spec in it has unique ordinals and target names, casts and
//! primary keys that point at kept columns, and a position after every table
//! it depends on.

use std::collections::HashSet;
use thiserror::Error;

use super::{CastRule, TableSpec};

/// Largest precision SQL Server and PostgreSQL agree on for exact numerics
const MAX_DECIMAL_PRECISION: u8 = 38;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{table}: source ordinals are 1-based, got 0")]
    ZeroOrdinal { table: String },

    #[error("{table}: source ordinal {ordinal} is mapped more than once")]
    DuplicateOrdinal { table: String, ordinal: usize },

    #[error("{table}: target column '{column}' is mapped more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("{table}: no source column is mapped to a target column")]
    NoMappedColumns { table: String },

    #[error("{table}: cast rule for '{column}' does not name a mapped column")]
    UnmappedCastRule { table: String, column: String },

    #[error("{table}: primary key '{column}' does not name a mapped column")]
    UnmappedPrimaryKey { table: String, column: String },

    #[error("{table}: invalid decimal({precision},{scale}) on '{column}'")]
    InvalidDecimal {
        table: String,
        column: String,
        precision: u8,
        scale: u8,
    },

    #[error("Table '{0}' is registered more than once")]
    DuplicateTable(String),

    #[error("Source '{0}' feeds more than one table")]
    DuplicateSource(String),

    #[error("{table} depends on '{depends_on}', which must be registered before it")]
    DependencyOrder { table: String, depends_on: String },

    #[error("Unknown table '{0}'")]
    UnknownTable(String),
}

impl TableSpec {
    /// Check the invariants of a single spec
    pub fn validate(&self) -> Result<(), RegistryError> {
        let table = || self.target_table.clone();

        let mut ordinals = HashSet::new();
        for mapping in &self.columns {
            if mapping.ordinal == 0 {
                return Err(RegistryError::ZeroOrdinal { table: table() });
            }
            if !ordinals.insert(mapping.ordinal) {
                return Err(RegistryError::DuplicateOrdinal {
                    table: table(),
                    ordinal: mapping.ordinal,
                });
            }
        }

        let mut names = HashSet::new();
        for column in self.mapped_columns() {
            if !names.insert(column.name) {
                return Err(RegistryError::DuplicateColumn {
                    table: table(),
                    column: column.name.to_string(),
                });
            }
        }
        if names.is_empty() {
            return Err(RegistryError::NoMappedColumns { table: table() });
        }

        for (column, rule) in &self.cast_rules {
            if !names.contains(column.as_str()) {
                return Err(RegistryError::UnmappedCastRule {
                    table: table(),
                    column: column.clone(),
                });
            }
            if let CastRule::Decimal { precision, scale } = *rule {
                if precision == 0 || precision > MAX_DECIMAL_PRECISION || scale > precision {
                    return Err(RegistryError::InvalidDecimal {
                        table: table(),
                        column: column.clone(),
                        precision,
                        scale,
                    });
                }
            }
        }

        if let Some(ref pk) = self.primary_key {
            if !names.contains(pk.as_str()) {
                return Err(RegistryError::UnmappedPrimaryKey {
                    table: table(),
                    column: pk.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Table specifications in load order
#[derive(Debug, Clone)]
pub struct Registry {
    specs: Vec<TableSpec>,
}

impl Registry {
    /// Validate and register `specs`; their order is the load order
    pub fn new(specs: Vec<TableSpec>) -> Result<Self, RegistryError> {
        let mut tables = HashSet::new();
        let mut sources = HashSet::new();

        for spec in &specs {
            spec.validate()?;

            for dependency in &spec.depends_on {
                if !tables.contains(dependency.as_str()) {
                    return Err(RegistryError::DependencyOrder {
                        table: spec.target_table.clone(),
                        depends_on: dependency.clone(),
                    });
                }
            }
            if !tables.insert(spec.target_table.as_str()) {
                return Err(RegistryError::DuplicateTable(spec.target_table.clone()));
            }
            if !sources.insert(spec.source_id.as_str()) {
                return Err(RegistryError::DuplicateSource(spec.source_id.clone()));
            }
        }

        Ok(Self { specs })
    }

    /// The built-in property, licensing and violation datasets
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::new(super::catalog::datasets())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableSpec> {
        self.specs.iter()
    }

    pub fn get(&self, table: &str) -> Option<&TableSpec> {
        self.specs.iter().find(|s| s.target_table == table)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Restrict to `tables`, keeping registry order. Dependencies are not pulled in.
    pub fn select<S: AsRef<str>>(&self, tables: &[S]) -> Result<Vec<&TableSpec>, RegistryError> {
        for name in tables {
            if self.get(name.as_ref()).is_none() {
                return Err(RegistryError::UnknownTable(name.as_ref().to_string()));
            }
        }
        Ok(self
            .specs
            .iter()
            .filter(|s| tables.iter().any(|t| t.as_ref() == s.target_table))
            .collect())
    }
}
