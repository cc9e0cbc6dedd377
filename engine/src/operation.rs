//! Batch operations handed to a storage adapter.
//!
//! A batch is an ordered list of these, applied atomically.

use crate::{row::RawRow, RecordId, TableName};
use serde::{Deserialize, Serialize};

/// A prepared change waiting on a record for its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreparedKind {
    Create,
    Update,
    MarkAsDeleted,
    DestroyPermanently,
}

impl std::fmt::Display for PreparedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreparedKind::Create => write!(f, "create"),
            PreparedKind::Update => write!(f, "update"),
            PreparedKind::MarkAsDeleted => write!(f, "markAsDeleted"),
            PreparedKind::DestroyPermanently => write!(f, "destroyPermanently"),
        }
    }
}

/// One operation in a persisted batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BatchOperation {
    /// Insert a new row.
    Create { table: TableName, raw: RawRow },
    /// Replace an existing row.
    Update { table: TableName, raw: RawRow },
    /// Flag a row as deleted, keeping it for sync.
    MarkAsDeleted { table: TableName, id: RecordId },
    /// Remove a row outright.
    DestroyPermanently { table: TableName, id: RecordId },
}

impl BatchOperation {
    /// Get the table this operation targets.
    pub fn table(&self) -> &TableName {
        match self {
            BatchOperation::Create { table, .. } => table,
            BatchOperation::Update { table, .. } => table,
            BatchOperation::MarkAsDeleted { table, .. } => table,
            BatchOperation::DestroyPermanently { table, .. } => table,
        }
    }

    /// Get the record ID this operation targets.
    pub fn record_id(&self) -> Option<&str> {
        match self {
            BatchOperation::Create { raw, .. } | BatchOperation::Update { raw, .. } => {
                raw.get(crate::row::ID_COLUMN).and_then(|v| v.as_str())
            }
            BatchOperation::MarkAsDeleted { id, .. } => Some(id),
            BatchOperation::DestroyPermanently { id, .. } => Some(id),
        }
    }

    /// The prepared kind this operation flushes.
    pub fn kind(&self) -> PreparedKind {
        match self {
            BatchOperation::Create { .. } => PreparedKind::Create,
            BatchOperation::Update { .. } => PreparedKind::Update,
            BatchOperation::MarkAsDeleted { .. } => PreparedKind::MarkAsDeleted,
            BatchOperation::DestroyPermanently { .. } => PreparedKind::DestroyPermanently,
        }
    }
}
