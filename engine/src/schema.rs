//! Schema definition and validation.
//!
//! A schema is a static, data-driven list of column descriptors per table.
//! Records consult it through one generic accessor instead of per-field code.

use crate::{
    error::Result,
    row::{CHANGED_COLUMN, ID_COLUMN, STATUS_COLUMN},
    value::Value,
    ColumnName, Error, SchemaVersion, TableName,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Column types supported in schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Boolean,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::String => write!(f, "string"),
            ColumnType::Number => write!(f, "number"),
            ColumnType::Boolean => write!(f, "boolean"),
        }
    }
}

/// Automatic timestamp semantics for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoTimestamp {
    /// Set once when the record is prepared for creation.
    Created,
    /// Set on creation and touched on every update.
    Updated,
}

/// Definition of a column in a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    /// Column name
    pub name: ColumnName,
    /// Column type
    pub column_type: ColumnType,
    /// Whether the column may hold null
    pub optional: bool,
    /// Automatic timestamp kind, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_timestamp: Option<AutoTimestamp>,
}

impl ColumnSchema {
    /// Create a new required column.
    pub fn required(name: impl Into<ColumnName>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            optional: false,
            auto_timestamp: None,
        }
    }

    /// Create a new optional column.
    pub fn optional(name: impl Into<ColumnName>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            optional: true,
            auto_timestamp: None,
        }
    }

    /// Mark the column as an automatic timestamp.
    pub fn with_timestamp(mut self, kind: AutoTimestamp) -> Self {
        self.auto_timestamp = Some(kind);
        self
    }

    /// The value a freshly created row holds for this column.
    pub fn default_value(&self) -> Value {
        if self.optional {
            return Value::Null;
        }
        match self.column_type {
            ColumnType::String => Value::String(String::new()),
            ColumnType::Number => Value::Number(0.0),
            ColumnType::Boolean => Value::Bool(false),
        }
    }
}

/// Schema for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// Table name
    pub name: TableName,
    /// Column definitions, in declaration order
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Create a new table schema.
    pub fn new(name: impl Into<TableName>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns carrying the given automatic timestamp kind.
    pub fn timestamp_columns(&self, kind: AutoTimestamp) -> impl Iterator<Item = &ColumnSchema> {
        self.columns
            .iter()
            .filter(move |c| c.auto_timestamp == Some(kind))
    }

    /// Validate the table definition.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidSchema("table name must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            let name = column.name.as_str();
            if name.is_empty() {
                return Err(Error::InvalidSchema(format!(
                    "table '{}' declares a column with an empty name",
                    self.name
                )));
            }
            if matches!(name, ID_COLUMN | STATUS_COLUMN | CHANGED_COLUMN) {
                return Err(Error::InvalidSchema(format!(
                    "column '{}' in table '{}' uses a reserved name",
                    name, self.name
                )));
            }
            if !seen.insert(name) {
                return Err(Error::InvalidSchema(format!(
                    "column '{}' declared twice in table '{}'",
                    name, self.name
                )));
            }
            if column.auto_timestamp.is_some() && column.column_type != ColumnType::Number {
                return Err(Error::InvalidSchema(format!(
                    "timestamp column '{}' in table '{}' must be a number, not {}",
                    name, self.name, column.column_type
                )));
            }
        }

        Ok(())
    }
}

/// Schema for the whole database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSchema {
    /// Schema version for migrations
    pub version: SchemaVersion,
    /// Table schemas by name
    pub tables: BTreeMap<TableName, TableSchema>,
}

impl AppSchema {
    /// Create a new schema.
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version,
            tables: BTreeMap::new(),
        }
    }

    /// Add a table to the schema.
    pub fn add_table(&mut self, table: TableSchema) -> &mut Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Builder-style method to add a table.
    pub fn with_table(mut self, table: TableSchema) -> Self {
        self.add_table(table);
        self
    }

    /// Get a table schema by name.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// Validate every table.
    pub fn validate(&self) -> Result<()> {
        self.tables.values().try_for_each(TableSchema::validate)
    }
}
