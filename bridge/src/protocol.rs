//! Bridge message protocol definitions.
//!
//! Requests carry `{type, payload, cloneStrategy}` and responses carry
//! `{type, payload}`. Neither carries an identifier: a response belongs to
//! the oldest request still waiting, so the transport must deliver
//! responses in the order requests were sent.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tidepool_engine::{BatchOperation, RecordId, TableName};

use crate::config::ConfigError;
use crate::error::Result;

/// Storage operations a worker can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
    Find,
    Batch,
    GetDeletedRecords,
    DestroyDeletedRecords,
    GetLocal,
    SetLocal,
    RemoveLocal,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationType::Find => "find",
            OperationType::Batch => "batch",
            OperationType::GetDeletedRecords => "getDeletedRecords",
            OperationType::DestroyDeletedRecords => "destroyDeletedRecords",
            OperationType::GetLocal => "getLocal",
            OperationType::SetLocal => "setLocal",
            OperationType::RemoveLocal => "removeLocal",
        };
        f.write_str(name)
    }
}

/// How a payload is copied across the worker boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneStrategy {
    /// Pass the owned payload through.
    #[default]
    Shallow,
    /// Pass the owned payload through; the sender promises not to reuse it.
    Immutable,
    /// Round-trip the payload through its JSON encoding.
    Deep,
}

impl CloneStrategy {
    /// Prepare a payload for the other side of the boundary.
    pub fn transfer(self, payload: Value) -> Result<Value> {
        match self {
            CloneStrategy::Shallow | CloneStrategy::Immutable => Ok(payload),
            CloneStrategy::Deep => {
                let encoded = serde_json::to_vec(&payload)?;
                Ok(serde_json::from_slice(&encoded)?)
            }
        }
    }
}

impl FromStr for CloneStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shallow" => Ok(CloneStrategy::Shallow),
            "immutable" => Ok(CloneStrategy::Immutable),
            "deep" => Ok(CloneStrategy::Deep),
            other => Err(ConfigError::InvalidCloneStrategy(other.to_string())),
        }
    }
}

/// Message sent to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(rename = "type")]
    pub operation: OperationType,
    pub payload: Value,
    #[serde(default)]
    pub clone_strategy: CloneStrategy,
}

/// Message sent back by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Response {
    #[serde(rename = "RESPONSE_SUCCESS")]
    Success(Value),
    #[serde(rename = "RESPONSE_ERROR")]
    Error(Value),
}

impl Response {
    /// Create an error response from structured error info.
    pub fn error(info: ErrorInfo) -> Self {
        // ErrorInfo is plain JSON data, so encoding cannot fail
        Response::Error(serde_json::to_value(&info).unwrap_or(Value::Null))
    }
}

/// Error payload produced by a worker.
///
/// Engine errors fill `code` with the variant name and `detail` with its
/// fields, which is enough to rebuild the variant on the caller's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            detail: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// The engine error this payload was produced from, if any.
    pub fn to_engine_error(&self) -> Option<tidepool_engine::Error> {
        let code = self.code.as_ref()?;
        let mut encoded = serde_json::Map::new();
        encoded.insert("code".into(), Value::String(code.clone()));
        if let Some(detail) = &self.detail {
            encoded.insert("detail".into(), detail.clone());
        }
        serde_json::from_value(Value::Object(encoded)).ok()
    }
}

impl From<tidepool_engine::Error> for ErrorInfo {
    fn from(err: tidepool_engine::Error) -> Self {
        let mut info = ErrorInfo::new(err.to_string());
        if let Ok(Value::Object(mut encoded)) = serde_json::to_value(&err) {
            info.code = encoded
                .remove("code")
                .and_then(|code| code.as_str().map(str::to_string));
            info.detail = encoded.remove("detail");
        }
        info
    }
}

// ============================================================================
// Operation arguments
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindArgs {
    pub table: TableName,
    pub id: RecordId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchArgs {
    pub operations: Vec<BatchOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableArgs {
    pub table: TableName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestroyDeletedArgs {
    pub table: TableName,
    pub records: Vec<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalKeyArgs {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetLocalArgs {
    pub key: String,
    pub value: String,
}
