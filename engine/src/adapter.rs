//! Storage adapter contract.
//!
//! The engine never touches physical storage itself. Everything persisted
//! goes through a [`StorageAdapter`], which may run in-process
//! ([`crate::MemoryAdapter`]) or behind a worker bridge.

use async_trait::async_trait;

use crate::{error::Result, row::RawRow, BatchOperation, RecordId};

/// Persistence backend used by a [`crate::Database`].
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Fetch one raw row, if present.
    async fn find(&self, table: &str, id: &str) -> Result<Option<RawRow>>;

    /// Apply all operations atomically: either every one lands or none does.
    async fn batch(&self, operations: Vec<BatchOperation>) -> Result<()>;

    /// Ids of rows in `table` flagged as deleted but not yet purged.
    async fn get_deleted_records(&self, table: &str) -> Result<Vec<RecordId>>;

    /// Purge the given deleted rows.
    async fn destroy_deleted_records(&self, table: &str, ids: &[RecordId]) -> Result<()>;

    /// Local key/value storage, outside any table.
    async fn get_local(&self, key: &str) -> Result<Option<String>>;

    async fn set_local(&self, key: &str, value: &str) -> Result<()>;

    async fn remove_local(&self, key: &str) -> Result<()>;
}
