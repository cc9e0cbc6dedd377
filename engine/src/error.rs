//! Error types for the Tidepool engine.

use crate::{ColumnName, RecordId, TableName};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All possible errors from the Tidepool engine.
///
/// Serializes as `{"code": <variant>, "detail": <fields>}` so storage
/// running elsewhere can report errors that decode back to the same variant.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail")]
pub enum Error {
    // Write discipline
    #[error("illegal mutation: {0}")]
    IllegalMutation(String),

    #[error("uncommitted record: {0}")]
    UncommittedRecord(RecordId),

    #[error("pending update in progress for record {0}")]
    PendingUpdateConflict(RecordId),

    #[error("record has been destroyed: {0}")]
    DestroyedRecord(RecordId),

    #[error("record is marked as deleted: {0}")]
    DeletedRecord(RecordId),

    #[error("action scope required: {0}")]
    ActionScopeViolation(String),

    // Batch errors
    #[error("record has no prepared change to flush: {0}")]
    NotPrepared(RecordId),

    #[error("record appears more than once in a batch: {0}")]
    DuplicateInBatch(RecordId),

    #[error("record belongs to another database: {0}")]
    ForeignRecord(RecordId),

    // Schema and row validation
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("table not found: {0}")]
    TableNotFound(TableName),

    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: TableName, column: ColumnName },

    #[error("invalid row: {0}")]
    InvalidRow(String),

    // Storage errors
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("record already exists: {0}")]
    RecordAlreadyExists(RecordId),

    #[error("storage adapter error: {0}")]
    Adapter(String),

    /// A storage failure that is not an engine error, with its raw payload.
    #[error("storage error: {message}")]
    Storage {
        message: String,
        payload: serde_json::Value,
    },

    #[error("database has been closed")]
    DatabaseClosed,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
