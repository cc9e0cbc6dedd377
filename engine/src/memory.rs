//! In-memory storage adapter.
//!
//! Batches are applied to a copy of the tables and swapped in on success,
//! so a failing operation leaves storage untouched.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    adapter::StorageAdapter,
    error::Result,
    row::{RawRow, SyncStatus, ID_COLUMN, STATUS_COLUMN},
    BatchOperation, Error, RecordId, TableName,
};

type Table = BTreeMap<RecordId, RawRow>;

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<TableName, Table>,
    local: HashMap<String, String>,
}

/// A [`StorageAdapter`] holding every row in memory.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    state: Mutex<MemoryState>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw row directly, bypassing batches. Used to seed storage.
    pub fn insert_raw(&self, table: &str, raw: RawRow) -> Result<()> {
        let id = row_id(&raw)?;
        self.state
            .lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id, raw);
        Ok(())
    }

    /// Snapshot of one stored row.
    pub fn get_raw(&self, table: &str, id: &str) -> Option<RawRow> {
        self.state.lock().tables.get(table)?.get(id).cloned()
    }

    /// Number of rows stored in a table, including deleted ones.
    pub fn row_count(&self, table: &str) -> usize {
        self.state.lock().tables.get(table).map_or(0, Table::len)
    }
}

fn row_id(raw: &RawRow) -> Result<RecordId> {
    raw.get(ID_COLUMN)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidRow("raw row has no string id".into()))
}

fn apply(tables: &mut HashMap<TableName, Table>, op: BatchOperation) -> Result<()> {
    match op {
        BatchOperation::Create { table, raw } => {
            let id = row_id(&raw)?;
            let rows = tables.entry(table).or_default();
            if rows.contains_key(&id) {
                return Err(Error::RecordAlreadyExists(id));
            }
            rows.insert(id, raw);
        }
        BatchOperation::Update { table, raw } => {
            let id = row_id(&raw)?;
            let row = tables
                .get_mut(&table)
                .and_then(|rows| rows.get_mut(&id))
                .ok_or_else(|| Error::RecordNotFound(id.clone()))?;
            *row = raw;
        }
        BatchOperation::MarkAsDeleted { table, id } => {
            let row = tables
                .get_mut(&table)
                .and_then(|rows| rows.get_mut(&id))
                .ok_or_else(|| Error::RecordNotFound(id.clone()))?;
            row.insert(STATUS_COLUMN.into(), SyncStatus::Deleted.as_str().into());
        }
        BatchOperation::DestroyPermanently { table, id } => {
            if let Some(rows) = tables.get_mut(&table) {
                rows.remove(&id);
            }
        }
    }
    Ok(())
}

fn is_deleted(raw: &RawRow) -> bool {
    raw.get(STATUS_COLUMN).and_then(|v| v.as_str()) == Some(SyncStatus::Deleted.as_str())
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn find(&self, table: &str, id: &str) -> Result<Option<RawRow>> {
        Ok(self.get_raw(table, id))
    }

    async fn batch(&self, operations: Vec<BatchOperation>) -> Result<()> {
        let mut state = self.state.lock();
        let mut staged = state.tables.clone();
        let count = operations.len();

        for op in operations {
            apply(&mut staged, op)?;
        }

        state.tables = staged;
        tracing::debug!(operations = count, "Memory batch applied");
        Ok(())
    }

    async fn get_deleted_records(&self, table: &str) -> Result<Vec<RecordId>> {
        let state = self.state.lock();
        Ok(state
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, raw)| is_deleted(raw))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn destroy_deleted_records(&self, table: &str, ids: &[RecordId]) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(rows) = state.tables.get_mut(table) {
            rows.retain(|id, raw| !(ids.contains(id) && is_deleted(raw)));
        }
        Ok(())
    }

    async fn get_local(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.lock().local.get(key).cloned())
    }

    async fn set_local(&self, key: &str, value: &str) -> Result<()> {
        self.state
            .lock()
            .local
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_local(&self, key: &str) -> Result<()> {
        self.state.lock().local.remove(key);
        Ok(())
    }
}
