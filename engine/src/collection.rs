//! Collections: the per-table entry point for creating and loading records.
//!
//! Each collection keeps an identity map of committed records, so loading
//! the same row twice yields the same [`Record`].

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{
    action::ActionScope,
    database::{Database, DatabaseInner},
    error::Result,
    record::{Record, Writer},
    row::{RawRow, SanitizedRow, SyncStatus},
    schema::TableSchema,
    stream::ObservableStream,
    tracker::ChangeTracker,
    Error, RecordId,
};

/// How a batch changed a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Destroyed,
}

/// One entry of a collection change set.
#[derive(Debug, Clone)]
pub struct CollectionChange {
    pub record: Arc<Record>,
    pub kind: ChangeKind,
}

/// Records of one table.
pub struct Collection {
    table: Arc<TableSchema>,
    tracker: ChangeTracker,
    database: Weak<DatabaseInner>,
    cache: Mutex<HashMap<RecordId, Arc<Record>>>,
    changes: ObservableStream<Vec<CollectionChange>>,
}

impl Collection {
    pub(crate) fn new(
        table: TableSchema,
        tracker: ChangeTracker,
        database: Weak<DatabaseInner>,
    ) -> Self {
        Self {
            table: Arc::new(table),
            tracker,
            database,
            cache: Mutex::new(HashMap::new()),
            changes: ObservableStream::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table.name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.table
    }

    pub(crate) fn schema_arc(&self) -> Arc<TableSchema> {
        Arc::clone(&self.table)
    }

    pub(crate) fn tracker(&self) -> ChangeTracker {
        self.tracker
    }

    /// The owning database.
    pub fn database(&self) -> Result<Database> {
        self.database
            .upgrade()
            .map(Database::from_inner)
            .ok_or(Error::DatabaseClosed)
    }

    /// Build a draft record. It is not persisted until passed to
    /// [`Database::batch`].
    pub fn prepare_create<F>(self: &Arc<Self>, initializer: F) -> Result<Arc<Record>>
    where
        F: FnOnce(&mut Writer<'_>) -> Result<()>,
    {
        let now = self.database()?.now_ms();
        Record::prepare_create(self, now, initializer)
    }

    /// Create and persist a record.
    pub async fn create<F>(
        self: &Arc<Self>,
        scope: Option<&ActionScope>,
        initializer: F,
    ) -> Result<Arc<Record>>
    where
        F: FnOnce(&mut Writer<'_>) -> Result<()>,
    {
        let database = self.database()?;
        database.check_action(scope)?;
        let record = self.prepare_create(initializer)?;
        database.batch(scope, [Arc::clone(&record)]).await?;
        Ok(record)
    }

    /// A committed record already in memory.
    pub fn cached(&self, id: &str) -> Option<Arc<Record>> {
        self.cache.lock().get(id).cloned()
    }

    /// Wrap a persisted raw row, reusing the in-memory record if one exists.
    pub fn hydrate(self: &Arc<Self>, raw: &RawRow) -> Result<Arc<Record>> {
        let row = SanitizedRow::from_raw(raw, &self.table)?;
        Ok(self.hydrate_row(row))
    }

    fn hydrate_row(self: &Arc<Self>, row: SanitizedRow) -> Arc<Record> {
        let mut cache = self.cache.lock();
        if let Some(existing) = cache.get(row.id()) {
            return Arc::clone(existing);
        }

        let record = Record::hydrate(self, row);
        cache.insert(record.id().to_string(), Arc::clone(&record));
        record
    }

    /// Load a record by id, from memory or from storage.
    ///
    /// Rows marked as deleted are not found.
    pub async fn find(self: &Arc<Self>, id: &str) -> Result<Arc<Record>> {
        if let Some(record) = self.cached(id) {
            return Ok(record);
        }

        let database = self.database()?;
        let raw = database
            .adapter()
            .find(&self.table.name, id)
            .await?
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;
        let row = SanitizedRow::from_raw(&raw, &self.table)?;
        if row.status() == SyncStatus::Deleted {
            return Err(Error::RecordNotFound(id.to_string()));
        }
        Ok(self.hydrate_row(row))
    }

    /// Permanently remove a record of this collection.
    pub async fn destroy_permanently(
        &self,
        scope: Option<&ActionScope>,
        record: &Arc<Record>,
    ) -> Result<()> {
        if record.table_name() != self.table.name {
            return Err(Error::InvalidRow(format!(
                "record {} belongs to table '{}', not '{}'",
                record.id(),
                record.table_name(),
                self.table.name
            )));
        }

        let database = self.database()?;
        let prepared = record.prepare_destroy_permanently(scope)?;
        database.batch(scope, [prepared]).await
    }

    /// Change sets emitted after every batch touching this collection.
    pub fn changes(&self) -> ObservableStream<Vec<CollectionChange>> {
        self.changes.clone()
    }

    /// Bring the identity map in line with a landed batch.
    pub(crate) fn apply_to_cache(&self, changes: &[CollectionChange]) {
        let mut cache = self.cache.lock();
        for change in changes {
            match change.kind {
                ChangeKind::Created | ChangeKind::Updated => {
                    cache.insert(change.record.id().to_string(), Arc::clone(&change.record));
                }
                ChangeKind::Destroyed => {
                    cache.remove(change.record.id());
                }
            }
        }
    }

    pub(crate) fn notify(&self, changes: Vec<CollectionChange>) {
        if !changes.is_empty() {
            self.changes.notify_changed(changes);
        }
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("table", &self.table.name)
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}
