//! # Tidepool Bridge
//!
//! Dispatches storage operations to an out-of-line worker and correlates
//! the replies back to their callers.
//!
//! Requests and responses carry no identifiers. The [`Bridge`] keeps its
//! waiting callers in a FIFO queue and settles the oldest one with each
//! response, so the channel to the worker must preserve order. Workers
//! built by [`spawn_worker`] do: they execute one request at a time, in
//! arrival order.
//!
//! [`BridgeAdapter`] wraps a bridge as a [`tidepool_engine::StorageAdapter`],
//! so a database can keep its storage on a worker thread:
//!
//! ```rust
//! use std::sync::Arc;
//! use tidepool_bridge::{BridgeAdapter, BridgeConfig};
//! use tidepool_engine::{MemoryAdapter, StorageAdapter};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = BridgeAdapter::spawn(&BridgeConfig::default(), Arc::new(MemoryAdapter::new()))?;
//! adapter.set_local("cursor", "42").await?;
//! assert_eq!(adapter.get_local("cursor").await?, Some("42".to_string()));
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod error;
pub mod executor;
pub mod protocol;
pub mod worker;

pub use adapter::BridgeAdapter;
pub use bridge::Bridge;
pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, Result};
pub use executor::{AdapterExecutor, Executor};
pub use protocol::{CloneStrategy, ErrorInfo, OperationType, Request, Response};
pub use worker::{serve, spawn_worker, RequestSender, ResponseReceiver, WorkerKind};
