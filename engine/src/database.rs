//! The database: schema, collections, action queue and batch persistence.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{
    action::{ActionQueue, ActionScope},
    adapter::StorageAdapter,
    collection::{ChangeKind, Collection, CollectionChange},
    error::Result,
    record::Record,
    schema::AppSchema,
    tracker::ChangeTracker,
    Error, PreparedKind, TableName, Timestamp,
};

static NEXT_DATABASE_ID: AtomicU64 = AtomicU64::new(1);

/// Source of wall-clock time for automatic timestamp columns.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> Timestamp;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Timestamp {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Database behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Require an [`ActionScope`] for every write.
    pub actions_enabled: bool,
    /// Skip bookkeeping for writes that do not change a value.
    pub diff_mode: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            actions_enabled: true,
            diff_mode: true,
        }
    }
}

pub(crate) struct DatabaseInner {
    id: u64,
    schema: AppSchema,
    adapter: Arc<dyn StorageAdapter>,
    config: DatabaseConfig,
    clock: Arc<dyn Clock>,
    actions: ActionQueue,
    collections: HashMap<TableName, Arc<Collection>>,
}

/// Handle to a database. Clones share the same state.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Open a database over `adapter` using the system clock.
    pub fn new(
        schema: AppSchema,
        adapter: Arc<dyn StorageAdapter>,
        config: DatabaseConfig,
    ) -> Result<Self> {
        Self::with_clock(schema, adapter, config, Arc::new(SystemClock))
    }

    /// Open a database with an explicit clock.
    pub fn with_clock(
        schema: AppSchema,
        adapter: Arc<dyn StorageAdapter>,
        config: DatabaseConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        schema.validate()?;
        let id = NEXT_DATABASE_ID.fetch_add(1, Ordering::Relaxed);
        let tracker = ChangeTracker::new(config.diff_mode);

        let inner = Arc::new_cyclic(|weak| {
            let collections = schema
                .tables
                .values()
                .map(|table| {
                    let collection = Collection::new(table.clone(), tracker, weak.clone());
                    (table.name.clone(), Arc::new(collection))
                })
                .collect();

            DatabaseInner {
                id,
                schema,
                adapter,
                config,
                clock,
                actions: ActionQueue::new(),
                collections,
            }
        });

        tracing::debug!(
            database_id = id,
            tables = inner.collections.len(),
            actions_enabled = config.actions_enabled,
            diff_mode = config.diff_mode,
            "Database opened"
        );
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<DatabaseInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn schema(&self) -> &AppSchema {
        &self.inner.schema
    }

    pub fn config(&self) -> DatabaseConfig {
        self.inner.config
    }

    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.inner.adapter
    }

    pub fn now_ms(&self) -> Timestamp {
        self.inner.clock.now_ms()
    }

    /// The collection for `table`.
    pub fn collection(&self, table: &str) -> Result<Arc<Collection>> {
        self.inner
            .collections
            .get(table)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(table.to_string()))
    }

    /// Verify that a write may proceed under `scope`.
    pub fn check_action(&self, scope: Option<&ActionScope>) -> Result<()> {
        if !self.inner.config.actions_enabled {
            return Ok(());
        }
        match scope {
            Some(scope) if scope.database_id() == self.inner.id => Ok(()),
            Some(scope) => Err(Error::ActionScopeViolation(format!(
                "scope belongs to database {}, not {}",
                scope.database_id(),
                self.inner.id
            ))),
            None => Err(Error::ActionScopeViolation(
                "writes must run inside Database::action".into(),
            )),
        }
    }

    /// Run `work` as a serialized action.
    ///
    /// Actions run one at a time, in the order they were requested. The
    /// next action starts once `work` completes and its scope is dropped.
    /// Calling `action` from inside an action waits forever.
    pub async fn action<F, Fut, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce(ActionScope) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let scope = self.inner.actions.enter(self.inner.id).await;
        tracing::trace!(database_id = self.inner.id, "Action started");
        let result = work(scope).await;
        tracing::trace!(
            database_id = self.inner.id,
            ok = result.is_ok(),
            "Action finished"
        );
        result
    }

    /// Whether an action currently holds the queue.
    pub fn is_action_running(&self) -> bool {
        self.inner.actions.is_busy()
    }

    /// Persist the prepared changes of `records` in one atomic batch.
    ///
    /// Invalid input is rejected before anything is sent and leaves prepared
    /// changes in place. Every record must come from this database.
    /// Record notifications fire in batch order. If the adapter fails, every
    /// record is rolled back to the row it had before preparation.
    pub async fn batch<I>(&self, scope: Option<&ActionScope>, records: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<Record>>,
    {
        self.check_action(scope)?;

        let records: Vec<Arc<Record>> = records.into_iter().collect();
        if records.is_empty() {
            return Ok(());
        }

        let mut seen = HashSet::with_capacity(records.len());
        let mut operations = Vec::with_capacity(records.len());
        for record in &records {
            if !self.owns(record) {
                return Err(Error::ForeignRecord(record.id().to_string()));
            }
            if !seen.insert((record.table_name(), record.id())) {
                return Err(Error::DuplicateInBatch(record.id().to_string()));
            }
            operations.push(record.batch_operation()?);
        }

        if let Err(err) = self.inner.adapter.batch(operations).await {
            tracing::warn!(
                database_id = self.inner.id,
                records = records.len(),
                error = %err,
                "Batch failed, rolling back prepared changes"
            );
            for record in &records {
                record.rollback_prepared();
            }
            return Err(err);
        }

        let mut committed = Vec::with_capacity(records.len());
        for record in &records {
            let Some(kind) = record.commit_prepared() else {
                continue;
            };
            let kind = match kind {
                PreparedKind::Create => ChangeKind::Created,
                PreparedKind::Update => ChangeKind::Updated,
                PreparedKind::MarkAsDeleted | PreparedKind::DestroyPermanently => {
                    ChangeKind::Destroyed
                }
            };
            committed.push(CollectionChange {
                record: Arc::clone(record),
                kind,
            });
        }

        // Per-table change sets, tables in order of first appearance.
        let mut changes: Vec<(Arc<Collection>, Vec<CollectionChange>)> = Vec::new();
        for change in &committed {
            let table = change.record.table_name();
            match changes.iter_mut().find(|(c, _)| c.table() == table) {
                Some((_, set)) => set.push(change.clone()),
                None => {
                    if let Some(collection) = self.inner.collections.get(table) {
                        changes.push((Arc::clone(collection), vec![change.clone()]));
                    }
                }
            }
        }

        for (collection, set) in &changes {
            collection.apply_to_cache(set);
        }

        for change in &committed {
            match change.kind {
                ChangeKind::Created => {}
                ChangeKind::Updated => change.record.notify_changed(),
                ChangeKind::Destroyed => change.record.notify_destroyed(),
            }
        }

        tracing::debug!(
            database_id = self.inner.id,
            records = records.len(),
            "Batch committed"
        );

        for (collection, set) in changes {
            collection.notify(set);
        }
        Ok(())
    }

    /// Whether `record` was created by one of this database's collections.
    fn owns(&self, record: &Record) -> bool {
        let Ok(collection) = record.collection() else {
            return false;
        };
        self.inner
            .collections
            .get(record.table_name())
            .is_some_and(|own| Arc::ptr_eq(own, &collection))
    }

    /// Read a local key/value entry.
    pub async fn get_local(&self, key: &str) -> Result<Option<String>> {
        self.inner.adapter.get_local(key).await
    }

    pub async fn set_local(&self, key: &str, value: &str) -> Result<()> {
        self.inner.adapter.set_local(key, value).await
    }

    pub async fn remove_local(&self, key: &str) -> Result<()> {
        self.inner.adapter.remove_local(key).await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.inner.id)
            .field("schema_version", &self.inner.schema.version)
            .field("config", &self.inner.config)
            .finish()
    }
}
