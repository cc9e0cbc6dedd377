//! A storage adapter that runs every operation through a [`Bridge`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tidepool_engine::{BatchOperation, RawRow, RecordId, StorageAdapter};

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::executor::{AdapterExecutor, Executor};
use crate::protocol::{
    BatchArgs, CloneStrategy, DestroyDeletedArgs, FindArgs, LocalKeyArgs, OperationType,
    SetLocalArgs, TableArgs,
};

/// Caller-side [`StorageAdapter`] backed by a worker.
#[derive(Debug)]
pub struct BridgeAdapter {
    bridge: Bridge,
    clone_strategy: CloneStrategy,
}

impl BridgeAdapter {
    pub fn new(bridge: Bridge, clone_strategy: CloneStrategy) -> Self {
        Self {
            bridge,
            clone_strategy,
        }
    }

    /// Spawn a worker executing against `executor`, configured by `config`.
    pub fn connect(config: &BridgeConfig, executor: Arc<dyn Executor>) -> Result<Self, BridgeError> {
        let bridge = Bridge::connect(config, executor)?;
        Ok(Self::new(bridge, config.clone_strategy))
    }

    /// Run `storage` behind a worker.
    pub fn spawn<A>(config: &BridgeConfig, storage: Arc<A>) -> Result<Self, BridgeError>
    where
        A: StorageAdapter + ?Sized + 'static,
    {
        Self::connect(config, Arc::new(AdapterExecutor::new(storage)))
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    async fn call<A, R>(&self, operation: OperationType, args: &A) -> tidepool_engine::Result<R>
    where
        A: Serialize + Sync,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_value(args).map_err(BridgeError::from)?;
        let result = self
            .bridge
            .send(operation, payload, self.clone_strategy)
            .await?;
        Ok(serde_json::from_value(result).map_err(BridgeError::from)?)
    }
}

#[async_trait]
impl StorageAdapter for BridgeAdapter {
    async fn find(&self, table: &str, id: &str) -> tidepool_engine::Result<Option<RawRow>> {
        let args = FindArgs {
            table: table.to_string(),
            id: id.to_string(),
        };
        self.call(OperationType::Find, &args).await
    }

    async fn batch(&self, operations: Vec<BatchOperation>) -> tidepool_engine::Result<()> {
        let args = BatchArgs { operations };
        self.call(OperationType::Batch, &args).await
    }

    async fn get_deleted_records(&self, table: &str) -> tidepool_engine::Result<Vec<RecordId>> {
        let args = TableArgs {
            table: table.to_string(),
        };
        self.call(OperationType::GetDeletedRecords, &args).await
    }

    async fn destroy_deleted_records(
        &self,
        table: &str,
        ids: &[RecordId],
    ) -> tidepool_engine::Result<()> {
        let args = DestroyDeletedArgs {
            table: table.to_string(),
            records: ids.to_vec(),
        };
        self.call(OperationType::DestroyDeletedRecords, &args).await
    }

    async fn get_local(&self, key: &str) -> tidepool_engine::Result<Option<String>> {
        let args = LocalKeyArgs {
            key: key.to_string(),
        };
        self.call(OperationType::GetLocal, &args).await
    }

    async fn set_local(&self, key: &str, value: &str) -> tidepool_engine::Result<()> {
        let args = SetLocalArgs {
            key: key.to_string(),
            value: value.to_string(),
        };
        self.call(OperationType::SetLocal, &args).await
    }

    async fn remove_local(&self, key: &str) -> tidepool_engine::Result<()> {
        let args = LocalKeyArgs {
            key: key.to_string(),
        };
        self.call(OperationType::RemoveLocal, &args).await
    }
}
