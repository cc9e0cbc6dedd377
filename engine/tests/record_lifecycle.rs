//! Record lifecycle tests for tidepool-engine
//!
//! These tests drive records through a real database and in-memory
//! storage: creation, updates, batches, deletion and observation.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tidepool_engine::{
    ActionScope, AppSchema, AutoTimestamp, BatchOperation, Clock, ColumnSchema, ColumnType,
    Database, DatabaseConfig, Error, MemoryAdapter, Notification, RawRow, Record, RecordId,
    StorageAdapter, SyncStatus, TableSchema, Value,
};

fn create_test_schema() -> AppSchema {
    AppSchema::new(1)
        .with_table(TableSchema::new(
            "mock",
            vec![
                ColumnSchema::required("name", ColumnType::String),
                ColumnSchema::required("otherfield", ColumnType::String),
                ColumnSchema::optional("count", ColumnType::Number),
            ],
        ))
        .with_table(TableSchema::new(
            "notes",
            vec![
                ColumnSchema::required("body", ColumnType::String),
                ColumnSchema::required("created_at", ColumnType::Number)
                    .with_timestamp(AutoTimestamp::Created),
                ColumnSchema::required("updated_at", ColumnType::Number)
                    .with_timestamp(AutoTimestamp::Updated),
            ],
        ))
}

fn raw(value: serde_json::Value) -> RawRow {
    value.as_object().cloned().unwrap()
}

/// Open a database and seed one synced row per id.
fn setup(config: DatabaseConfig, ids: &[&str]) -> (Database, Arc<MemoryAdapter>) {
    let adapter = Arc::new(MemoryAdapter::new());
    for id in ids {
        adapter
            .insert_raw("mock", raw(json!({"id": id, "name": "Original name"})))
            .unwrap();
    }
    let db = Database::new(create_test_schema(), adapter.clone(), config).unwrap();
    (db, adapter)
}

fn unscoped() -> DatabaseConfig {
    DatabaseConfig {
        actions_enabled: false,
        ..DatabaseConfig::default()
    }
}

async fn load(db: &Database, id: &str) -> Arc<Record> {
    db.collection("mock").unwrap().find(id).await.unwrap()
}

type Log = Arc<Mutex<Vec<String>>>;

fn record_log(log: &Log, tag: &'static str) -> impl Fn(&Notification<Arc<Record>>) + Send + Sync {
    let log = Arc::clone(log);
    move |n| {
        let entry = match n {
            Notification::Next(record) => format!("{tag}:next:{}", record.id()),
            Notification::Complete => format!("{tag}:complete"),
        };
        log.lock().push(entry);
    }
}

// ============================================================================
// Change tracking
// ============================================================================

#[tokio::test]
async fn changed_set_grows_without_duplicates() {
    let (db, adapter) = setup(unscoped(), &["r1"]);
    let record = load(&db, "r1").await;
    assert_eq!(record.status(), SyncStatus::Synced);

    record.update(None, |r| r.set("name", "New name")).await.unwrap();
    assert_eq!(record.get_raw("_status"), Some(Value::from("updated")));
    assert_eq!(record.get_raw("_changed"), Some(Value::from("name")));

    record
        .update(None, |r| r.set("otherfield", "Something"))
        .await
        .unwrap();
    assert_eq!(record.get_raw("_changed"), Some(Value::from("name,otherfield")));

    record
        .update(None, |r| r.set("name", "Another name"))
        .await
        .unwrap();
    assert_eq!(record.get_raw("_changed"), Some(Value::from("name,otherfield")));

    let stored = adapter.get_raw("mock", "r1").unwrap();
    assert_eq!(stored["_status"], json!("updated"));
    assert_eq!(stored["_changed"], json!("name,otherfield"));
    assert_eq!(stored["name"], json!("Another name"));
}

#[tokio::test]
async fn diff_mode_ignores_equal_writes() {
    let (db, _) = setup(unscoped(), &["r1"]);
    let record = load(&db, "r1").await;

    record
        .update(None, |r| r.set("name", "Original name"))
        .await
        .unwrap();

    assert_eq!(record.status(), SyncStatus::Synced);
    assert!(record.changed_columns().is_empty());
}

#[tokio::test]
async fn without_diff_mode_equal_writes_are_tracked() {
    let config = DatabaseConfig {
        actions_enabled: false,
        diff_mode: false,
    };
    let (db, _) = setup(config, &["r1"]);
    let record = load(&db, "r1").await;

    record
        .update(None, |r| r.set("name", "Original name"))
        .await
        .unwrap();

    assert_eq!(record.status(), SyncStatus::Updated);
    assert_eq!(record.changed_columns().to_raw_string(), "name");
}

#[tokio::test]
async fn created_records_stay_created() {
    let (db, adapter) = setup(unscoped(), &[]);
    let mock = db.collection("mock").unwrap();

    let record = mock.create(None, |r| r.set("name", "Fresh")).await.unwrap();
    assert!(record.is_committed());
    assert_eq!(record.status(), SyncStatus::Created);

    record.update(None, |r| r.set("otherfield", "x")).await.unwrap();

    assert_eq!(record.status(), SyncStatus::Created);
    assert!(record.changed_columns().is_empty());
    let stored = adapter.get_raw("mock", record.id()).unwrap();
    assert_eq!(stored["_status"], json!("created"));
    assert_eq!(stored["otherfield"], json!("x"));
}

#[tokio::test]
async fn create_fills_defaults() {
    let (db, _) = setup(unscoped(), &[]);
    let record = db
        .collection("mock")
        .unwrap()
        .create(None, |r| r.set("name", "Only name"))
        .await
        .unwrap();

    assert_eq!(record.id().len(), 16);
    assert_eq!(record.get_raw("otherfield"), Some(Value::from("")));
    assert_eq!(record.get_raw("count"), Some(Value::Null));
    assert!(record.changed_columns().is_empty());
}

// ============================================================================
// Timestamps
// ============================================================================

struct ManualClock(AtomicI64);

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn timestamps_follow_the_clock() {
    let clock = Arc::new(ManualClock(AtomicI64::new(1_000)));
    let db = Database::with_clock(
        create_test_schema(),
        Arc::new(MemoryAdapter::new()),
        unscoped(),
        clock.clone(),
    )
    .unwrap();
    let notes = db.collection("notes").unwrap();

    let note = notes.create(None, |n| n.set("body", "hello")).await.unwrap();
    assert_eq!(note.get_raw("created_at"), Some(Value::Number(1_000.0)));
    assert_eq!(note.get_raw("updated_at"), Some(Value::Number(1_000.0)));

    clock.0.store(2_500, Ordering::SeqCst);
    // a no-op mutator still touches the update timestamp
    note.update(None, |_| Ok(())).await.unwrap();

    assert_eq!(note.get_raw("created_at"), Some(Value::Number(1_000.0)));
    assert_eq!(note.get_raw("updated_at"), Some(Value::Number(2_500.0)));
}

// ============================================================================
// Write discipline
// ============================================================================

#[tokio::test]
async fn uncommitted_records_reject_everything() {
    let (db, _) = setup(unscoped(), &[]);
    let draft = db
        .collection("mock")
        .unwrap()
        .prepare_create(|r| r.set("name", "draft"))
        .unwrap();

    assert!(matches!(
        draft.update(None, |_| Ok(())).await,
        Err(Error::UncommittedRecord(_))
    ));
    assert!(matches!(
        draft.mark_as_deleted(None).await,
        Err(Error::UncommittedRecord(_))
    ));
    assert!(matches!(
        draft.destroy_permanently(None).await,
        Err(Error::UncommittedRecord(_))
    ));
    assert!(matches!(draft.observe(), Err(Error::UncommittedRecord(_))));

    // flushing the draft commits it
    db.batch(None, [Arc::clone(&draft)]).await.unwrap();
    assert!(draft.is_committed());
    assert!(draft.observe().is_ok());
}

#[tokio::test]
async fn second_prepare_update_blocks_update() {
    let (db, adapter) = setup(unscoped(), &["r1"]);
    let record = load(&db, "r1").await;

    let prepared = record.prepare_update(None, |r| r.set("name", "first")).unwrap();
    assert!(record.has_pending_flush());

    let second = record.prepare_update(None, |r| r.set("name", "second"));
    assert_eq!(second.unwrap_err(), Error::PendingUpdateConflict("r1".into()));

    let rejected = record.update(None, |r| r.set("name", "third")).await;
    assert_eq!(rejected.unwrap_err(), Error::PendingUpdateConflict("r1".into()));
    assert_eq!(record.get_raw("name"), Some(Value::from("first")));

    db.batch(None, [prepared]).await.unwrap();
    assert!(!record.has_pending_flush());
    assert_eq!(adapter.get_raw("mock", "r1").unwrap()["name"], json!("first"));

    record.update(None, |r| r.set("name", "fourth")).await.unwrap();
    assert_eq!(record.get_raw("name"), Some(Value::from("fourth")));
}

#[tokio::test]
async fn batch_rejects_misuse_before_storage() {
    let (db, adapter) = setup(unscoped(), &["r1", "r2"]);
    let a = load(&db, "r1").await;
    let b = load(&db, "r2").await;

    let not_prepared = db.batch(None, [Arc::clone(&b)]).await;
    assert_eq!(not_prepared.unwrap_err(), Error::NotPrepared("r2".into()));

    a.prepare_update(None, |r| r.set("name", "A")).unwrap();
    let duplicate = db.batch(None, [Arc::clone(&a), Arc::clone(&a)]).await;
    assert_eq!(duplicate.unwrap_err(), Error::DuplicateInBatch("r1".into()));

    // the prepared change survives and can still be flushed
    assert!(a.has_pending_flush());
    assert_eq!(adapter.get_raw("mock", "r1").unwrap()["name"], json!("Original name"));
    db.batch(None, [Arc::clone(&a)]).await.unwrap();
    assert_eq!(adapter.get_raw("mock", "r1").unwrap()["name"], json!("A"));
}

#[tokio::test]
async fn multi_record_batch() {
    let (db, adapter) = setup(unscoped(), &["r1", "r2"]);
    let mock = db.collection("mock").unwrap();
    let a = load(&db, "r1").await;
    let b = load(&db, "r2").await;

    let log: Log = Arc::default();
    a.observe().unwrap().subscribe(record_log(&log, "a"));
    b.observe().unwrap().subscribe(record_log(&log, "b"));

    let created = mock.prepare_create(|r| r.set("name", "C")).unwrap();
    db.batch(
        None,
        [
            a.prepare_update(None, |r| r.set("count", 1)).unwrap(),
            b.prepare_mark_as_deleted(None).unwrap(),
            Arc::clone(&created),
        ],
    )
    .await
    .unwrap();

    assert_eq!(*log.lock(), vec!["a:next:r1", "b:complete"]);
    assert_eq!(adapter.get_raw("mock", "r1").unwrap()["count"], json!(1));
    assert_eq!(adapter.get_raw("mock", "r2").unwrap()["_status"], json!("deleted"));
    assert!(adapter.get_raw("mock", created.id()).is_some());
    assert!(mock.cached("r2").is_none());
    assert!(mock.cached(created.id()).is_some());
}

#[tokio::test]
async fn batch_rejects_records_of_another_database() {
    let (a, a_store) = setup(unscoped(), &[]);
    let (b, b_store) = setup(unscoped(), &[]);

    let draft = b
        .collection("mock")
        .unwrap()
        .prepare_create(|r| r.set("name", "From B"))
        .unwrap();

    let result = a.batch(None, [Arc::clone(&draft)]).await;

    assert_eq!(result.unwrap_err(), Error::ForeignRecord(draft.id().to_string()));
    assert!(a_store.get_raw("mock", draft.id()).is_none());
    assert!(a.collection("mock").unwrap().cached(draft.id()).is_none());
    assert!(draft.has_pending_flush());

    // the owning database still accepts it
    b.batch(None, [Arc::clone(&draft)]).await.unwrap();
    assert!(b_store.get_raw("mock", draft.id()).is_some());
}

#[tokio::test]
async fn notifications_follow_batch_order_across_tables() {
    let (db, adapter) = setup(unscoped(), &["r1", "r2"]);
    adapter
        .insert_raw("notes", raw(json!({"id": "n1", "body": "Note"})))
        .unwrap();
    let a = load(&db, "r1").await;
    let b = load(&db, "r2").await;
    let note = db.collection("notes").unwrap().find("n1").await.unwrap();

    let log: Log = Arc::default();
    a.observe().unwrap().subscribe(record_log(&log, "a"));
    note.observe().unwrap().subscribe(record_log(&log, "note"));
    b.observe().unwrap().subscribe(record_log(&log, "b"));

    db.batch(
        None,
        [
            a.prepare_update(None, |r| r.set("name", "A")).unwrap(),
            note.prepare_update(None, |r| r.set("body", "Edited")).unwrap(),
            b.prepare_update(None, |r| r.set("name", "B")).unwrap(),
        ],
    )
    .await
    .unwrap();

    assert_eq!(*log.lock(), vec!["a:next:r1", "note:next:n1", "b:next:r2"]);
}

// ============================================================================
// Actions
// ============================================================================

#[tokio::test]
async fn writes_require_an_action() {
    let (db, _) = setup(DatabaseConfig::default(), &["r1"]);
    let record = load(&db, "r1").await;

    let result = record.update(None, |r| r.set("name", "x")).await;
    assert!(matches!(result, Err(Error::ActionScopeViolation(_))));
    assert_eq!(record.get_raw("name"), Some(Value::from("Original name")));
    assert!(!record.is_editing());

    let handle = Arc::clone(&record);
    db.action(move |scope| async move {
        handle.update(Some(&scope), |r| r.set("name", "inside")).await
    })
    .await
    .unwrap();
    assert_eq!(record.get_raw("name"), Some(Value::from("inside")));
}

#[tokio::test]
async fn scope_from_another_database_is_rejected() {
    let (db, _) = setup(DatabaseConfig::default(), &["r1"]);
    let (other, _) = setup(DatabaseConfig::default(), &[]);
    let record = load(&db, "r1").await;

    let handle = Arc::clone(&record);
    let result = other
        .action(move |scope| async move {
            handle.update(Some(&scope), |r| r.set("name", "x")).await
        })
        .await;

    assert!(matches!(result, Err(Error::ActionScopeViolation(_))));
    assert_eq!(record.status(), SyncStatus::Synced);
}

#[tokio::test]
async fn actions_run_one_at_a_time() {
    let (db, _) = setup(DatabaseConfig::default(), &[]);
    let log: Log = Arc::default();

    let step = |name: &'static str| {
        let log = Arc::clone(&log);
        move |scope: ActionScope| async move {
            let _scope = scope;
            log.lock().push(format!("{name}:start"));
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            log.lock().push(format!("{name}:end"));
            Ok::<_, Error>(())
        }
    };

    let (a, b) = tokio::join!(db.action(step("a")), db.action(step("b")));
    a.unwrap();
    b.unwrap();

    assert_eq!(*log.lock(), vec!["a:start", "a:end", "b:start", "b:end"]);
    assert!(!db.is_action_running());
}

// ============================================================================
// Observation
// ============================================================================

#[tokio::test]
async fn subscribers_see_only_later_changes_in_order() {
    let (db, _) = setup(unscoped(), &["r1"]);
    let record = load(&db, "r1").await;
    let stream = record.observe().unwrap();
    let log: Log = Arc::default();

    stream.subscribe(record_log(&log, "first"));
    record.update(None, |r| r.set("count", 1)).await.unwrap();

    stream.subscribe(record_log(&log, "second"));
    record.update(None, |r| r.set("count", 2)).await.unwrap();

    stream.subscribe(record_log(&log, "third"));
    record.update(None, |r| r.set("count", 3)).await.unwrap();

    record.destroy_permanently(None).await.unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "first:next:r1",
            "first:next:r1",
            "second:next:r1",
            "first:next:r1",
            "second:next:r1",
            "third:next:r1",
            "first:complete",
            "second:complete",
            "third:complete",
        ]
    );
}

#[tokio::test]
async fn destroy_is_terminal() {
    let (db, adapter) = setup(unscoped(), &["r1"]);
    let record = load(&db, "r1").await;
    let log: Log = Arc::default();
    record.observe().unwrap().subscribe(record_log(&log, "early"));

    record.destroy_permanently(None).await.unwrap();

    assert!(record.is_destroyed());
    assert!(adapter.get_raw("mock", "r1").is_none());
    assert!(db.collection("mock").unwrap().cached("r1").is_none());

    assert!(matches!(
        record.update(None, |r| r.set("name", "x")).await,
        Err(Error::DestroyedRecord(_))
    ));
    assert!(matches!(
        record.destroy_permanently(None).await,
        Err(Error::DestroyedRecord(_))
    ));

    // a late subscriber completes immediately
    let late = record.observe().unwrap();
    late.subscribe(record_log(&log, "late"));
    assert_eq!(late.subscriber_count(), 0);

    assert_eq!(*log.lock(), vec!["early:complete", "late:complete"]);
}

#[tokio::test]
async fn mark_as_deleted_keeps_row_for_sync() {
    let (db, adapter) = setup(unscoped(), &["r1"]);
    let record = load(&db, "r1").await;
    let log: Log = Arc::default();
    record.observe().unwrap().subscribe(record_log(&log, "sub"));

    record.mark_as_deleted(None).await.unwrap();

    assert_eq!(record.status(), SyncStatus::Deleted);
    assert!(!record.is_destroyed());
    assert_eq!(*log.lock(), vec!["sub:complete"]);
    assert_eq!(
        adapter.get_deleted_records("mock").await.unwrap(),
        vec![RecordId::from("r1")]
    );

    assert!(matches!(
        record.update(None, |r| r.set("name", "x")).await,
        Err(Error::DeletedRecord(_))
    ));

    // lookups no longer see the row, so no second record is loaded for it
    assert_eq!(
        db.collection("mock").unwrap().find("r1").await.unwrap_err(),
        Error::RecordNotFound("r1".into())
    );

    // a deleted row can still be destroyed
    record.destroy_permanently(None).await.unwrap();
    assert!(record.is_destroyed());
    assert_eq!(adapter.row_count("mock"), 0);
}

// ============================================================================
// Storage failures
// ============================================================================

/// Memory storage whose batches can be made to fail.
#[derive(Default)]
struct FlakyAdapter {
    inner: MemoryAdapter,
    failing: AtomicBool,
}

#[async_trait]
impl StorageAdapter for FlakyAdapter {
    async fn find(&self, table: &str, id: &str) -> tidepool_engine::Result<Option<RawRow>> {
        self.inner.find(table, id).await
    }

    async fn batch(&self, operations: Vec<BatchOperation>) -> tidepool_engine::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Adapter("disk full".into()));
        }
        self.inner.batch(operations).await
    }

    async fn get_deleted_records(&self, table: &str) -> tidepool_engine::Result<Vec<RecordId>> {
        self.inner.get_deleted_records(table).await
    }

    async fn destroy_deleted_records(
        &self,
        table: &str,
        ids: &[RecordId],
    ) -> tidepool_engine::Result<()> {
        self.inner.destroy_deleted_records(table, ids).await
    }

    async fn get_local(&self, key: &str) -> tidepool_engine::Result<Option<String>> {
        self.inner.get_local(key).await
    }

    async fn set_local(&self, key: &str, value: &str) -> tidepool_engine::Result<()> {
        self.inner.set_local(key, value).await
    }

    async fn remove_local(&self, key: &str) -> tidepool_engine::Result<()> {
        self.inner.remove_local(key).await
    }
}

#[tokio::test]
async fn failed_batch_rolls_back() {
    let adapter = Arc::new(FlakyAdapter::default());
    adapter
        .inner
        .insert_raw("mock", raw(json!({"id": "r1", "name": "Original name"})))
        .unwrap();
    let db = Database::new(create_test_schema(), adapter.clone(), unscoped()).unwrap();
    let record = load(&db, "r1").await;
    let log: Log = Arc::default();
    record.observe().unwrap().subscribe(record_log(&log, "sub"));

    adapter.failing.store(true, Ordering::SeqCst);
    let result = record.update(None, |r| r.set("name", "lost")).await;

    assert_eq!(result.unwrap_err(), Error::Adapter("disk full".into()));
    assert_eq!(record.get_raw("name"), Some(Value::from("Original name")));
    assert_eq!(record.status(), SyncStatus::Synced);
    assert!(record.changed_columns().is_empty());
    assert!(!record.has_pending_flush());
    assert!(log.lock().is_empty());

    let created = db
        .collection("mock")
        .unwrap()
        .create(None, |r| r.set("name", "never"))
        .await;
    assert!(matches!(created, Err(Error::Adapter(_))));

    adapter.failing.store(false, Ordering::SeqCst);
    record.update(None, |r| r.set("name", "kept")).await.unwrap();
    assert_eq!(*log.lock(), vec!["sub:next:r1"]);
}
