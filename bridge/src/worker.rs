//! Workers: the far side of the bridge.
//!
//! A worker reads requests from one channel, executes them strictly one at
//! a time in arrival order, and writes exactly one response per request to
//! the other channel. That ordering is what lets the [`crate::Bridge`]
//! correlate responses without identifiers.

use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::ConfigError;
use crate::error::{BridgeError, Result};
use crate::executor::Executor;
use crate::protocol::{ErrorInfo, Request, Response};

/// Sending half of the request channel.
pub type RequestSender = mpsc::UnboundedSender<Request>;
/// Receiving half of the response channel.
pub type ResponseReceiver = mpsc::UnboundedReceiver<Response>;

/// Where the worker runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkerKind {
    /// A dedicated OS thread with its own single-threaded runtime.
    #[default]
    Thread,
    /// A task on the caller's runtime.
    Inline,
}

impl FromStr for WorkerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(WorkerKind::Thread),
            "inline" => Ok(WorkerKind::Inline),
            other => Err(ConfigError::InvalidWorker(other.to_string())),
        }
    }
}

/// Start a worker and return the channel ends the bridge talks through.
///
/// `Inline` must be called from within a tokio runtime.
pub fn spawn_worker(
    kind: WorkerKind,
    executor: Arc<dyn Executor>,
) -> Result<(RequestSender, ResponseReceiver)> {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();

    match kind {
        WorkerKind::Thread => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| BridgeError::WorkerSpawn(e.to_string()))?;

            std::thread::Builder::new()
                .name("tidepool-worker".into())
                .spawn(move || runtime.block_on(serve(executor, request_rx, response_tx)))
                .map_err(|e| BridgeError::WorkerSpawn(e.to_string()))?;
        }
        WorkerKind::Inline => {
            let handle = tokio::runtime::Handle::try_current()
                .map_err(|e| BridgeError::WorkerSpawn(e.to_string()))?;
            handle.spawn(serve(executor, request_rx, response_tx));
        }
    }

    tracing::debug!(worker = ?kind, "Worker spawned");
    Ok((request_tx, response_rx))
}

/// Worker loop. Returns when either channel closes.
pub async fn serve(
    executor: Arc<dyn Executor>,
    mut requests: mpsc::UnboundedReceiver<Request>,
    responses: mpsc::UnboundedSender<Response>,
) {
    while let Some(request) = requests.recv().await {
        let response = handle(executor.as_ref(), request).await;
        if responses.send(response).is_err() {
            tracing::debug!("Response channel closed, worker stopping");
            return;
        }
    }

    tracing::debug!("Request channel closed, worker stopping");
}

async fn handle(executor: &dyn Executor, request: Request) -> Response {
    let Request {
        operation,
        payload,
        clone_strategy,
    } = request;

    let payload = match clone_strategy.transfer(payload) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(operation = %operation, error = %e, "Failed to receive payload");
            return Response::error(ErrorInfo::new(e.to_string()).with_code("Codec"));
        }
    };

    match executor.execute(operation, payload).await {
        Ok(result) => match clone_strategy.transfer(result) {
            Ok(result) => Response::Success(result),
            Err(e) => {
                tracing::error!(operation = %operation, error = %e, "Failed to send result");
                Response::error(ErrorInfo::new(e.to_string()).with_code("Codec"))
            }
        },
        Err(info) => {
            tracing::warn!(operation = %operation, error = %info.message, "Worker operation failed");
            Response::error(info)
        }
    }
}
