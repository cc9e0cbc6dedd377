//! # Tidepool Engine
//!
//! The record core of an embedded, offline-first reactive database.
//!
//! This crate provides records that wrap a sanitized row of typed columns,
//! track their sync status and changed-set, enforce a strict write
//! discipline, and expose a multicast change stream. Persistence is
//! delegated to a [`StorageAdapter`]; the engine itself performs no IO.
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] owns one [`SanitizedRow`]:
//! - A 16-character id, immutable once assigned
//! - Schema-declared columns, sanitized to their declared type
//! - A [`SyncStatus`] (`created`, `updated`, `synced`, `deleted`)
//! - A [`ChangedColumns`] set of columns mutated since the last sync
//!
//! ### Write scopes
//!
//! Columns change only through a [`Writer`], which exists only inside the
//! synchronous closure passed to [`Collection::create`],
//! [`Record::update`] or [`Record::prepare_update`]. Every write is routed
//! through the [`ChangeTracker`], which escalates `synced` rows to
//! `updated` and records the column.
//!
//! ### Actions and batches
//!
//! With [`DatabaseConfig::actions_enabled`], every write needs the
//! [`ActionScope`] handed out by [`Database::action`]. Prepared changes
//! are flushed atomically by [`Database::batch`].
//!
//! ### Streams
//!
//! [`Record::observe`] returns an [`ObservableStream`]: subscribers get
//! every change emitted after they subscribe, then exactly one
//! [`Notification::Complete`] when the record is deleted or destroyed.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tidepool_engine::{
//!     AppSchema, ColumnSchema, ColumnType, Database, DatabaseConfig, MemoryAdapter,
//!     SyncStatus, TableSchema,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tidepool_engine::Result<()> {
//! // 1. Define a schema
//! let schema = AppSchema::new(1).with_table(TableSchema::new(
//!     "tasks",
//!     vec![
//!         ColumnSchema::required("name", ColumnType::String),
//!         ColumnSchema::optional("note", ColumnType::String),
//!     ],
//! ));
//!
//! // 2. Open a database
//! let db = Database::new(schema, Arc::new(MemoryAdapter::new()), DatabaseConfig::default())?;
//! let tasks = db.collection("tasks")?;
//!
//! // 3. Write inside an action
//! let task = db
//!     .action(|scope| {
//!         let tasks = tasks.clone();
//!         async move { tasks.create(Some(&scope), |t| t.set("name", "Write docs")).await }
//!     })
//!     .await?;
//! assert_eq!(task.status(), SyncStatus::Created);
//!
//! // 4. Read it back
//! let found = tasks.find(task.id()).await?;
//! assert!(Arc::ptr_eq(&task, &found));
//! assert_eq!(found.get_raw("name"), Some("Write docs".into()));
//! # Ok(())
//! # }
//! ```

mod action;
pub mod adapter;
pub mod collection;
pub mod database;
pub mod error;
pub mod memory;
pub mod operation;
pub mod record;
pub mod row;
pub mod schema;
pub mod stream;
pub mod tracker;
pub mod value;

// Re-export main types at crate root
pub use action::ActionScope;
pub use adapter::StorageAdapter;
pub use collection::{ChangeKind, Collection, CollectionChange};
pub use database::{Clock, Database, DatabaseConfig, SystemClock};
pub use error::{Error, Result};
pub use memory::MemoryAdapter;
pub use operation::{BatchOperation, PreparedKind};
pub use record::{Record, RecordStream, Writer};
pub use row::{ChangedColumns, RawRow, SanitizedRow, SyncStatus};
pub use schema::{AppSchema, AutoTimestamp, ColumnSchema, ColumnType, TableSchema};
pub use stream::{Notification, ObservableStream, SubscriberId};
pub use tracker::{ChangeTracker, WriteEffect};
pub use value::Value;

/// Type aliases for clarity
pub type RecordId = String;
pub type TableName = String;
pub type ColumnName = String;
pub type SchemaVersion = u32;
/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;
