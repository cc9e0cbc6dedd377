//! Records: one sanitized row plus its write discipline and change stream.
//!
//! A record's columns can only change inside a write scope opened by
//! [`Collection::prepare_create`], [`Record::update`] or
//! [`Record::prepare_update`]. The scope hands the caller a [`Writer`],
//! and is strictly synchronous: it closes before any persistence work is
//! awaited. At most one scope is open per record, and a prepared change
//! blocks further scopes until a batch flushes it.
//!
//! Lifecycle: draft (prepared for creation, not committed) → committed →
//! updated any number of times → destroyed. Drafts that never commit are
//! inert; every stateful operation on them fails.

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::{
    action::ActionScope,
    collection::Collection,
    database::Database,
    error::Result,
    row::{
        generate_id, ChangedColumns, SanitizedRow, SyncStatus, CHANGED_COLUMN, ID_COLUMN,
        STATUS_COLUMN,
    },
    schema::{AutoTimestamp, TableSchema},
    stream::ObservableStream,
    tracker::ChangeTracker,
    value::Value,
    BatchOperation, Error, PreparedKind, RecordId,
};

/// Change stream of a single record.
pub type RecordStream = ObservableStream<Arc<Record>>;

/// A change waiting for its batch, with the row to restore if the batch fails.
#[derive(Debug)]
struct Prepared {
    kind: PreparedKind,
    before: SanitizedRow,
}

#[derive(Debug)]
struct RecordState {
    row: SanitizedRow,
    editing: bool,
    committed: bool,
    destroyed: bool,
    prepared: Option<Prepared>,
}

/// A record of some table.
pub struct Record {
    id: RecordId,
    table: Arc<TableSchema>,
    tracker: ChangeTracker,
    collection: Weak<Collection>,
    state: Mutex<RecordState>,
    stream: OnceLock<RecordStream>,
}

/// Write handle, only available inside a write scope.
pub struct Writer<'a> {
    record: &'a Record,
}

impl Writer<'_> {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Current value of a column, including writes made in this scope.
    pub fn get(&self, column: &str) -> Option<Value> {
        self.record.get_raw(column)
    }

    /// Write a column. The value is sanitized to the column type.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        self.record.write_column(column, value.into())
    }
}

/// Clears the editing flag when a scope ends, even on panic.
struct ScopeGuard<'a> {
    record: &'a Record,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.record.state.lock().editing = false;
    }
}

impl Record {
    fn new(collection: &Arc<Collection>, row: SanitizedRow, committed: bool) -> Self {
        Self {
            id: row.id().to_string(),
            table: collection.schema_arc(),
            tracker: collection.tracker(),
            collection: Arc::downgrade(collection),
            state: Mutex::new(RecordState {
                row,
                editing: false,
                committed,
                destroyed: false,
                prepared: None,
            }),
            stream: OnceLock::new(),
        }
    }

    /// Build a draft: default row, timestamps, then the initializer.
    pub(crate) fn prepare_create<F>(
        collection: &Arc<Collection>,
        now: i64,
        initializer: F,
    ) -> Result<Arc<Self>>
    where
        F: FnOnce(&mut Writer<'_>) -> Result<()>,
    {
        let table = collection.schema_arc();
        let row = SanitizedRow::new_default(&table, generate_id());
        let record = Arc::new(Self::new(collection, row, false));

        {
            let guard = record.open_scope();
            let mut writer = Writer {
                record: guard.record,
            };
            for column in table
                .timestamp_columns(AutoTimestamp::Created)
                .chain(table.timestamp_columns(AutoTimestamp::Updated))
            {
                writer.set(&column.name, now)?;
            }
            initializer(&mut writer)?;
        }

        {
            let mut state = record.state.lock();
            let before = state.row.clone();
            state.prepared = Some(Prepared {
                kind: PreparedKind::Create,
                before,
            });
        }

        tracing::debug!(record_id = %record.id, table = %table.name, "Record prepared for creation");
        Ok(record)
    }

    /// Wrap a row loaded from storage. The record is committed.
    pub(crate) fn hydrate(collection: &Arc<Collection>, row: SanitizedRow) -> Arc<Self> {
        Arc::new(Self::new(collection, row, true))
    }

    fn open_scope(&self) -> ScopeGuard<'_> {
        self.state.lock().editing = true;
        ScopeGuard { record: self }
    }

    /// Check the preconditions shared by every write-capable operation and
    /// open a scope if they hold. Checks and scope opening happen under one
    /// lock so two callers cannot both pass.
    fn begin_write(
        &self,
        database: &Database,
        scope: Option<&ActionScope>,
        allow_deleted: bool,
    ) -> Result<ScopeGuard<'_>> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(Error::DestroyedRecord(self.id.clone()));
        }
        if !state.committed {
            return Err(Error::UncommittedRecord(self.id.clone()));
        }
        if state.prepared.is_some() || state.editing {
            return Err(Error::PendingUpdateConflict(self.id.clone()));
        }
        database.check_action(scope)?;
        if !allow_deleted && state.row.status() == SyncStatus::Deleted {
            return Err(Error::DeletedRecord(self.id.clone()));
        }
        state.editing = true;
        Ok(ScopeGuard { record: self })
    }

    /// The single guarded entry point for column writes.
    fn write_column(&self, column: &str, value: Value) -> Result<()> {
        if column == ID_COLUMN {
            return Err(Error::IllegalMutation(format!(
                "the id of record {} cannot be changed",
                self.id
            )));
        }

        let mut state = self.state.lock();
        if state.destroyed {
            return Err(Error::DestroyedRecord(self.id.clone()));
        }
        if !state.editing {
            return Err(Error::IllegalMutation(format!(
                "record {} can only be modified inside create, update or prepare_update",
                self.id
            )));
        }
        if column == STATUS_COLUMN || column == CHANGED_COLUMN {
            return Err(Error::IllegalMutation(format!(
                "'{column}' is maintained by the change tracker"
            )));
        }

        let schema = self.table.column(column).ok_or_else(|| Error::UnknownColumn {
            table: self.table.name.clone(),
            column: column.to_string(),
        })?;
        self.tracker.apply_write(&mut state.row, schema, value);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.table
    }

    /// Read a column, or one of `id`, `_status`, `_changed`.
    pub fn get_raw(&self, column: &str) -> Option<Value> {
        if column == ID_COLUMN {
            return Some(Value::String(self.id.clone()));
        }
        let state = self.state.lock();
        match column {
            STATUS_COLUMN => Some(Value::from(state.row.status().as_str())),
            CHANGED_COLUMN => Some(Value::String(state.row.changed().to_raw_string())),
            _ => state.row.get(column).cloned(),
        }
    }

    /// Low-level write. Same rules as [`Writer::set`]: fails outside a
    /// write scope and always fails for `id`.
    pub fn set_raw(&self, column: &str, value: impl Into<Value>) -> Result<()> {
        self.write_column(column, value.into())
    }

    pub fn status(&self) -> SyncStatus {
        self.state.lock().row.status()
    }

    pub fn changed_columns(&self) -> ChangedColumns {
        self.state.lock().row.changed().clone()
    }

    /// Snapshot of the whole row.
    pub fn raw(&self) -> SanitizedRow {
        self.state.lock().row.clone()
    }

    pub fn is_editing(&self) -> bool {
        self.state.lock().editing
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().committed
    }

    pub fn has_pending_flush(&self) -> bool {
        self.state.lock().prepared.is_some()
    }

    pub fn prepared_kind(&self) -> Option<PreparedKind> {
        self.state.lock().prepared.as_ref().map(|p| p.kind)
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// The owning collection.
    pub fn collection(&self) -> Result<Arc<Collection>> {
        self.collection.upgrade().ok_or(Error::DatabaseClosed)
    }

    fn database(&self) -> Result<Database> {
        self.collection()?.database()
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Apply `mutator` inside a write scope and leave the change prepared
    /// for a batch. Returns the record to pass to [`Database::batch`].
    ///
    /// If the mutator fails, every write it made is undone.
    pub fn prepare_update<F>(
        self: &Arc<Self>,
        scope: Option<&ActionScope>,
        mutator: F,
    ) -> Result<Arc<Self>>
    where
        F: FnOnce(&mut Writer<'_>) -> Result<()>,
    {
        let database = self.database()?;
        let guard = self.begin_write(&database, scope, false)?;
        let before = self.state.lock().row.clone();
        let now = database.now_ms();

        let outcome = {
            let mut writer = Writer {
                record: guard.record,
            };
            self.table
                .timestamp_columns(AutoTimestamp::Updated)
                .try_for_each(|column| writer.set(&column.name, now))
                .and_then(|()| mutator(&mut writer))
        };

        {
            let mut state = self.state.lock();
            if let Err(err) = outcome {
                state.row = before;
                return Err(err);
            }
            state.prepared = Some(Prepared {
                kind: PreparedKind::Update,
                before,
            });
        }
        drop(guard);

        tracing::debug!(record_id = %self.id, status = %self.status(), "Update prepared");
        Ok(Arc::clone(self))
    }

    /// Update the record and persist it in a single-record batch.
    pub async fn update<F>(self: &Arc<Self>, scope: Option<&ActionScope>, mutator: F) -> Result<()>
    where
        F: FnOnce(&mut Writer<'_>) -> Result<()>,
    {
        let record = self.prepare_update(scope, mutator)?;
        self.database()?.batch(scope, [record]).await
    }

    /// Flag the record as deleted, keeping the row for sync.
    pub fn prepare_mark_as_deleted(
        self: &Arc<Self>,
        scope: Option<&ActionScope>,
    ) -> Result<Arc<Self>> {
        let database = self.database()?;
        let guard = self.begin_write(&database, scope, false)?;
        {
            let mut state = self.state.lock();
            let before = state.row.clone();
            self.tracker.mark_deleted(&mut state.row);
            state.prepared = Some(Prepared {
                kind: PreparedKind::MarkAsDeleted,
                before,
            });
        }
        drop(guard);
        Ok(Arc::clone(self))
    }

    pub async fn mark_as_deleted(self: &Arc<Self>, scope: Option<&ActionScope>) -> Result<()> {
        let record = self.prepare_mark_as_deleted(scope)?;
        self.database()?.batch(scope, [record]).await
    }

    /// Prepare permanent removal. Allowed on rows already marked deleted.
    pub fn prepare_destroy_permanently(
        self: &Arc<Self>,
        scope: Option<&ActionScope>,
    ) -> Result<Arc<Self>> {
        let database = self.database()?;
        let guard = self.begin_write(&database, scope, true)?;
        {
            let mut state = self.state.lock();
            let before = state.row.clone();
            state.prepared = Some(Prepared {
                kind: PreparedKind::DestroyPermanently,
                before,
            });
        }
        drop(guard);
        Ok(Arc::clone(self))
    }

    /// Remove the record through its collection. The record is terminal
    /// afterwards and its stream completes.
    pub async fn destroy_permanently(self: &Arc<Self>, scope: Option<&ActionScope>) -> Result<()> {
        let collection = self.collection()?;
        collection.destroy_permanently(scope, self).await
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    fn stream(&self) -> &RecordStream {
        self.stream.get_or_init(ObservableStream::new)
    }

    /// The record's change stream.
    ///
    /// On a destroyed record the stream is already closed, so new
    /// subscribers complete immediately.
    pub fn observe(&self) -> Result<RecordStream> {
        if !self.is_committed() {
            return Err(Error::UncommittedRecord(self.id.clone()));
        }
        Ok(self.stream().clone())
    }

    pub(crate) fn notify_changed(self: &Arc<Self>) {
        // Nobody can be subscribed to a stream that was never created.
        if let Some(stream) = self.stream.get() {
            stream.notify_changed(Arc::clone(self));
        }
    }

    pub(crate) fn notify_destroyed(&self) {
        self.stream().notify_destroyed();
    }

    // ------------------------------------------------------------------
    // Batch hooks
    // ------------------------------------------------------------------

    /// The operation that flushes this record's prepared change.
    pub(crate) fn batch_operation(&self) -> Result<BatchOperation> {
        let state = self.state.lock();
        if state.destroyed {
            return Err(Error::DestroyedRecord(self.id.clone()));
        }
        let prepared = state
            .prepared
            .as_ref()
            .ok_or_else(|| Error::NotPrepared(self.id.clone()))?;

        let table = self.table.name.clone();
        Ok(match prepared.kind {
            PreparedKind::Create => BatchOperation::Create {
                table,
                raw: state.row.to_raw(),
            },
            PreparedKind::Update => BatchOperation::Update {
                table,
                raw: state.row.to_raw(),
            },
            PreparedKind::MarkAsDeleted => BatchOperation::MarkAsDeleted {
                table,
                id: self.id.clone(),
            },
            PreparedKind::DestroyPermanently => BatchOperation::DestroyPermanently {
                table,
                id: self.id.clone(),
            },
        })
    }

    /// The batch landed: clear the prepared change and advance the lifecycle.
    pub(crate) fn commit_prepared(&self) -> Option<PreparedKind> {
        let mut state = self.state.lock();
        let kind = state.prepared.take()?.kind;
        state.committed = true;
        if kind == PreparedKind::DestroyPermanently {
            state.destroyed = true;
        }
        Some(kind)
    }

    /// The batch failed: restore the row and drop the prepared change.
    pub(crate) fn rollback_prepared(&self) {
        let mut state = self.state.lock();
        if let Some(prepared) = state.prepared.take() {
            state.row = prepared.before;
        }
    }
}

impl Drop for Record {
    fn drop(&mut self) {
        if let Some(prepared) = &self.state.get_mut().prepared {
            tracing::warn!(
                record_id = %self.id,
                table = %self.table.name,
                kind = %prepared.kind,
                "Record dropped with a prepared change that was never flushed"
            );
        }
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("table", &self.table.name)
            .field("status", &state.row.status())
            .field("committed", &state.committed)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}
