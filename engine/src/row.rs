//! Sanitized rows: the validated column map a record wraps.

use crate::{
    error::Result,
    schema::TableSchema,
    value::{sanitize, Value},
    ColumnName, Error, RecordId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Identifier column name.
pub const ID_COLUMN: &str = "id";
/// Sync status bookkeeping column.
pub const STATUS_COLUMN: &str = "_status";
/// Changed-set bookkeeping column.
pub const CHANGED_COLUMN: &str = "_changed";
/// Length of generated record ids.
pub const ID_LENGTH: usize = 16;

/// A row as it sits in storage: a flat JSON object.
pub type RawRow = serde_json::Map<String, serde_json::Value>;

/// Generate a fresh 16 character record id.
pub fn generate_id() -> RecordId {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(ID_LENGTH);
    id
}

/// Synchronization state of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Created,
    Updated,
    Synced,
    Deleted,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Created => "created",
            SyncStatus::Updated => "updated",
            SyncStatus::Synced => "synced",
            SyncStatus::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(SyncStatus::Created),
            "updated" => Ok(SyncStatus::Updated),
            "synced" => Ok(SyncStatus::Synced),
            "deleted" => Ok(SyncStatus::Deleted),
            other => Err(Error::InvalidRow(format!("unknown sync status '{other}'"))),
        }
    }
}

/// Ordered, deduplicated set of changed column names.
///
/// At rest it is a comma-joined string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedColumns(Vec<ColumnName>);

impl ChangedColumns {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parse the at-rest form. Empty segments and repeats are dropped.
    pub fn parse(raw: &str) -> Self {
        let mut changed = Self::new();
        for column in raw.split(',').filter(|c| !c.is_empty()) {
            changed.insert(column);
        }
        changed
    }

    /// Append a column unless already present. Returns whether it was added.
    pub fn insert(&mut self, column: &str) -> bool {
        if self.contains(column) {
            return false;
        }
        self.0.push(column.to_string());
        true
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.iter().any(|c| c == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// The comma-joined at-rest form.
    pub fn to_raw_string(&self) -> String {
        self.0.join(",")
    }
}

impl std::fmt::Display for ChangedColumns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_raw_string())
    }
}

/// A validated row: id, typed columns, and sync bookkeeping.
///
/// Bookkeeping is only ever changed through [`crate::ChangeTracker`].
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedRow {
    id: RecordId,
    status: SyncStatus,
    changed: ChangedColumns,
    columns: BTreeMap<ColumnName, Value>,
}

impl SanitizedRow {
    /// Build a default-valued row for a new record.
    pub fn new_default(table: &TableSchema, id: impl Into<RecordId>) -> Self {
        let columns = table
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.default_value()))
            .collect();

        Self {
            id: id.into(),
            status: SyncStatus::Created,
            changed: ChangedColumns::new(),
            columns,
        }
    }

    /// Sanitize a persisted raw row against the table schema.
    ///
    /// A missing `_status` means the row came from storage as-is and is
    /// taken to be synced.
    pub fn from_raw(raw: &RawRow, table: &TableSchema) -> Result<Self> {
        let id = match raw.get(ID_COLUMN) {
            Some(serde_json::Value::String(id)) if !id.is_empty() => id.clone(),
            _ => {
                return Err(Error::InvalidRow(format!(
                    "row in table '{}' has no string id",
                    table.name
                )))
            }
        };

        let status = match raw.get(STATUS_COLUMN) {
            None | Some(serde_json::Value::Null) => SyncStatus::Synced,
            Some(serde_json::Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(Error::InvalidRow(format!(
                    "row '{id}' has a non-string status: {other}"
                )))
            }
        };

        let changed = match (status, raw.get(CHANGED_COLUMN)) {
            (SyncStatus::Synced, _) => ChangedColumns::new(),
            (_, Some(serde_json::Value::String(s))) => ChangedColumns::parse(s),
            _ => ChangedColumns::new(),
        };

        let columns = table
            .columns
            .iter()
            .map(|column| {
                let value = raw
                    .get(&column.name)
                    .map_or(Value::Null, Value::from_json);
                (column.name.clone(), sanitize(value, column))
            })
            .collect();

        Ok(Self {
            id,
            status,
            changed,
            columns,
        })
    }

    /// The at-rest form of this row.
    pub fn to_raw(&self) -> RawRow {
        let mut raw = RawRow::new();
        raw.insert(ID_COLUMN.into(), self.id.clone().into());
        raw.insert(STATUS_COLUMN.into(), self.status.as_str().into());
        raw.insert(CHANGED_COLUMN.into(), self.changed.to_raw_string().into());
        for (name, value) in &self.columns {
            raw.insert(name.clone(), value.to_json());
        }
        raw
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn changed(&self) -> &ChangedColumns {
        &self.changed
    }

    /// Current value of a column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// All columns in name order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn put(&mut self, column: &str, value: Value) {
        self.columns.insert(column.to_string(), value);
    }

    pub(crate) fn set_status(&mut self, status: SyncStatus) {
        self.status = status;
    }

    pub(crate) fn changed_mut(&mut self) -> &mut ChangedColumns {
        &mut self.changed
    }
}
