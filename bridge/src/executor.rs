//! Executors run decoded storage operations inside a worker.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tidepool_engine::StorageAdapter;

use crate::protocol::{
    BatchArgs, DestroyDeletedArgs, ErrorInfo, FindArgs, LocalKeyArgs, OperationType, SetLocalArgs,
    TableArgs,
};

/// Runs one operation and produces its response payload.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn execute(&self, operation: OperationType, payload: Value) -> Result<Value, ErrorInfo>;
}

/// Executes operations against a [`StorageAdapter`].
pub struct AdapterExecutor<A: ?Sized> {
    adapter: Arc<A>,
}

impl<A: ?Sized> AdapterExecutor<A> {
    pub fn new(adapter: Arc<A>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }
}

fn decode<T: DeserializeOwned>(operation: OperationType, payload: Value) -> Result<T, ErrorInfo> {
    serde_json::from_value(payload).map_err(|e| {
        ErrorInfo::new(format!("invalid {operation} payload: {e}")).with_code("InvalidPayload")
    })
}

fn encode<T: Serialize>(value: T) -> Result<Value, ErrorInfo> {
    serde_json::to_value(value).map_err(|e| ErrorInfo::new(e.to_string()).with_code("Codec"))
}

#[async_trait]
impl<A> Executor for AdapterExecutor<A>
where
    A: StorageAdapter + ?Sized + 'static,
{
    async fn execute(&self, operation: OperationType, payload: Value) -> Result<Value, ErrorInfo> {
        match operation {
            OperationType::Find => {
                let args: FindArgs = decode(operation, payload)?;
                encode(self.adapter.find(&args.table, &args.id).await?)
            }
            OperationType::Batch => {
                let args: BatchArgs = decode(operation, payload)?;
                self.adapter.batch(args.operations).await?;
                Ok(Value::Null)
            }
            OperationType::GetDeletedRecords => {
                let args: TableArgs = decode(operation, payload)?;
                encode(self.adapter.get_deleted_records(&args.table).await?)
            }
            OperationType::DestroyDeletedRecords => {
                let args: DestroyDeletedArgs = decode(operation, payload)?;
                self.adapter
                    .destroy_deleted_records(&args.table, &args.records)
                    .await?;
                Ok(Value::Null)
            }
            OperationType::GetLocal => {
                let args: LocalKeyArgs = decode(operation, payload)?;
                encode(self.adapter.get_local(&args.key).await?)
            }
            OperationType::SetLocal => {
                let args: SetLocalArgs = decode(operation, payload)?;
                self.adapter.set_local(&args.key, &args.value).await?;
                Ok(Value::Null)
            }
            OperationType::RemoveLocal => {
                let args: LocalKeyArgs = decode(operation, payload)?;
                self.adapter.remove_local(&args.key).await?;
                Ok(Value::Null)
            }
        }
    }
}
