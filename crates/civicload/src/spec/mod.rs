//! Table specifications
//!
//! A [`TableSpec`] is the declarative mapping from one delimited source file to
//! one target relation: which source positions are kept, what each kept column
//! is called in the target, how it is read on the server side and which safe
//! cast it goes through. Specs are assembled once at startup, validated by the
//! [`Registry`] and never mutated afterwards.
//!
//! # Example
//!
//! ```
//! use civicload::spec::{CastRule, TableSpec};
//!
//! let spec = TableSpec::builder("dbo.masterentity.csv", "master_entity")
//!     .column(1, "master_entity_id", 100)
//!     .column(2, "name_text", 400)
//!     .cast("master_entity_id", CastRule::Uuid)
//!     .primary_key("master_entity_id")
//!     .build();
//!
//! assert_eq!(spec.mapped_columns().count(), 2);
//! ```

pub mod catalog;
pub mod registry;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use registry::{Registry, RegistryError};

/// Staging type used when the server reads a source column positionally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadType {
    /// Bounded text of at most `n` characters
    Text(u16),
    /// Unbounded text
    TextMax,
}

/// Safe cast applied to a normalized value. Failure yields null, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastRule {
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    BigInt,
    /// Finite double precision float
    Float,
    /// Exact numeric with `precision` total digits, `scale` after the point
    Decimal { precision: u8, scale: u8 },
    /// Date and time without zone (offsets are normalized to UTC)
    Timestamp,
    Uuid,
}

impl CastRule {
    /// `DECIMAL(18,2)`, the money columns in the assessment extracts
    pub const MONEY: CastRule = CastRule::Decimal {
        precision: 18,
        scale: 2,
    };
}

impl fmt::Display for CastRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastRule::Int => f.write_str("int"),
            CastRule::BigInt => f.write_str("bigint"),
            CastRule::Float => f.write_str("float"),
            CastRule::Decimal { precision, scale } => write!(f, "decimal({},{})", precision, scale),
            CastRule::Timestamp => f.write_str("timestamp"),
            CastRule::Uuid => f.write_str("uuid"),
        }
    }
}

/// One position of the source row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// 1-based position in the source file
    pub ordinal: usize,
    /// Target column name; `None` drops the source column
    pub target: Option<String>,
    pub read_type: ReadType,
}

/// A kept column together with the cast it goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedColumn<'a> {
    pub ordinal: usize,
    pub name: &'a str,
    pub read_type: ReadType,
    pub cast: Option<CastRule>,
}

/// Declarative mapping from a source file to a target table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Source file name, relative to the data directory or blob container
    pub source_id: String,
    pub target_table: String,
    pub columns: Vec<ColumnMapping>,
    pub cast_rules: BTreeMap<String, CastRule>,
    /// Rows whose key is absent after cast are excluded by the bulk path
    pub primary_key: Option<String>,
    /// Tables whose keys this table references; they must load first
    pub depends_on: Vec<String>,
}

impl TableSpec {
    pub fn builder(source_id: impl Into<String>, target_table: impl Into<String>) -> TableSpecBuilder {
        TableSpecBuilder {
            spec: TableSpec {
                source_id: source_id.into(),
                target_table: target_table.into(),
                columns: Vec::new(),
                cast_rules: BTreeMap::new(),
                primary_key: None,
                depends_on: Vec::new(),
            },
        }
    }

    /// Kept columns in `columns` order, each paired with its cast rule
    pub fn mapped_columns(&self) -> impl Iterator<Item = MappedColumn<'_>> + '_ {
        self.columns.iter().filter_map(move |mapping| {
            mapping.target.as_deref().map(|name| MappedColumn {
                ordinal: mapping.ordinal,
                name,
                read_type: mapping.read_type,
                cast: self.cast_for(name),
            })
        })
    }

    pub fn cast_for(&self, column: &str) -> Option<CastRule> {
        self.cast_rules.get(column).copied()
    }

    pub fn primary_key_column(&self) -> Option<MappedColumn<'_>> {
        let pk = self.primary_key.as_deref()?;
        self.mapped_columns().find(|c| c.name == pk)
    }
}

/// Builder used by the catalog and by tests
pub struct TableSpecBuilder {
    spec: TableSpec,
}

impl TableSpecBuilder {
    /// Keep source position `ordinal` as `name`, read as text of at most `width` chars
    pub fn column(mut self, ordinal: usize, name: impl Into<String>, width: u16) -> Self {
        self.spec.columns.push(ColumnMapping {
            ordinal,
            target: Some(name.into()),
            read_type: ReadType::Text(width),
        });
        self
    }

    /// Keep source position `ordinal` as unbounded text
    pub fn column_max(mut self, ordinal: usize, name: impl Into<String>) -> Self {
        self.spec.columns.push(ColumnMapping {
            ordinal,
            target: Some(name.into()),
            read_type: ReadType::TextMax,
        });
        self
    }

    /// Drop source position `ordinal`
    pub fn skip(mut self, ordinal: usize) -> Self {
        self.spec.columns.push(ColumnMapping {
            ordinal,
            target: None,
            read_type: ReadType::TextMax,
        });
        self
    }

    pub fn cast(mut self, column: impl Into<String>, rule: CastRule) -> Self {
        self.spec.cast_rules.insert(column.into(), rule);
        self
    }

    /// Apply the same cast to several columns
    pub fn cast_all(mut self, columns: &[&str], rule: CastRule) -> Self {
        for column in columns {
            self.spec.cast_rules.insert((*column).to_string(), rule);
        }
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.spec.primary_key = Some(column.into());
        self
    }

    pub fn depends_on(mut self, table: impl Into<String>) -> Self {
        self.spec.depends_on.push(table.into());
        self
    }

    pub fn build(self) -> TableSpec {
        self.spec
    }
}
