//! Tidepool Bridge - runs a database whose storage lives on a worker.
//!
//! Opens an in-memory store behind the configured worker, then drives one
//! record through create, update and delete so the whole path can be
//! watched with `RUST_LOG=debug`.

use std::sync::Arc;

use tidepool_bridge::{BridgeAdapter, BridgeConfig};
use tidepool_engine::{
    AppSchema, AutoTimestamp, ColumnSchema, ColumnType, Database, DatabaseConfig, MemoryAdapter,
    Notification, TableSchema,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn schema() -> AppSchema {
    AppSchema::new(1).with_table(TableSchema::new(
        "tasks",
        vec![
            ColumnSchema::required("name", ColumnType::String),
            ColumnSchema::required("done", ColumnType::Boolean),
            ColumnSchema::required("created_at", ColumnType::Number)
                .with_timestamp(AutoTimestamp::Created),
            ColumnSchema::required("updated_at", ColumnType::Number)
                .with_timestamp(AutoTimestamp::Updated),
        ],
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tidepool_bridge=debug,tidepool_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = BridgeConfig::load()?;
    tracing::info!(
        worker = ?config.worker,
        clone_strategy = ?config.clone_strategy,
        "Starting Tidepool bridge"
    );

    let storage = Arc::new(MemoryAdapter::new());
    let adapter = BridgeAdapter::spawn(&config, storage.clone())?;
    let db = Database::new(schema(), Arc::new(adapter), DatabaseConfig::default())?;
    let tasks = db.collection("tasks")?;

    let task = db
        .action(|scope| {
            let tasks = tasks.clone();
            async move {
                tasks
                    .create(Some(&scope), |t| t.set("name", "Try the bridge"))
                    .await
            }
        })
        .await?;
    tracing::info!(record_id = %task.id(), status = %task.status(), "Task created");

    task.observe()?.subscribe(|notification| match notification {
        Notification::Next(task) => {
            tracing::info!(record_id = %task.id(), changed = %task.changed_columns(), "Task changed")
        }
        Notification::Complete => tracing::info!("Task stream completed"),
    });

    let handle = Arc::clone(&task);
    db.action(move |scope| async move {
        handle.update(Some(&scope), |t| t.set("done", true)).await?;
        handle.mark_as_deleted(Some(&scope)).await
    })
    .await?;

    let deleted = db.adapter().get_deleted_records("tasks").await?;
    tracing::info!(
        deleted = deleted.len(),
        stored = storage.row_count("tasks"),
        "Done"
    );

    Ok(())
}
