//! Ordered request/response correlation.
//!
//! The bridge keeps a FIFO queue of waiting callers. Every response settles
//! the oldest waiting caller; nothing in the response identifies its
//! request. Correctness therefore depends on the transport delivering
//! responses in exactly the order requests were sent. That is a hard
//! requirement on the channel and is not checked at runtime.
//!
//! Enqueueing a caller and transmitting its request happen inside one
//! critical section, so concurrent senders cannot transmit in a different
//! order than they enqueued.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::executor::Executor;
use crate::protocol::{CloneStrategy, OperationType, Request, Response};
use crate::worker::{spawn_worker, RequestSender, ResponseReceiver};

type Reply = oneshot::Sender<Result<Value>>;

struct State {
    pending: VecDeque<Reply>,
    /// `None` once the bridge is dropped or the worker has gone away.
    outbound: Option<RequestSender>,
}

struct Inner {
    state: Mutex<State>,
}

impl Inner {
    fn settle(&self, response: Response) {
        let Some(reply) = self.state.lock().pending.pop_front() else {
            tracing::warn!("Dropping response with no pending request");
            return;
        };

        let result = match response {
            Response::Success(payload) => Ok(payload),
            Response::Error(payload) => Err(BridgeError::Operation(payload)),
        };

        if reply.send(result).is_err() {
            tracing::debug!("Caller went away before its response arrived");
        }
    }

    fn disconnect(&self) {
        let pending: Vec<Reply> = {
            let mut state = self.state.lock();
            state.outbound = None;
            state.pending.drain(..).collect()
        };

        if !pending.is_empty() {
            tracing::warn!(pending = pending.len(), "Worker disconnected with requests in flight");
        }
        for reply in pending {
            let _ = reply.send(Err(BridgeError::Disconnected));
        }
    }
}

/// Caller-side end of a worker connection.
pub struct Bridge {
    inner: Arc<Inner>,
    pump: JoinHandle<()>,
}

impl Bridge {
    /// Wrap an existing channel pair.
    ///
    /// Spawns a task that settles callers as responses arrive, so this must
    /// be called from within a tokio runtime.
    pub fn new(requests: RequestSender, mut responses: ResponseReceiver) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                outbound: Some(requests),
            }),
        });

        let pump = {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                while let Some(response) = responses.recv().await {
                    inner.settle(response);
                }
                inner.disconnect();
            })
        };

        Self { inner, pump }
    }

    /// Spawn the configured worker around `executor` and connect to it.
    pub fn connect(config: &BridgeConfig, executor: Arc<dyn Executor>) -> Result<Self> {
        let (requests, responses) = spawn_worker(config.worker, executor)?;
        Ok(Self::new(requests, responses))
    }

    /// Send one request and wait for its response.
    pub async fn send(
        &self,
        operation: OperationType,
        payload: Value,
        clone_strategy: CloneStrategy,
    ) -> Result<Value> {
        let (reply, response) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();
            state.pending.push_back(reply);

            let request = Request {
                operation,
                payload,
                clone_strategy,
            };
            let sent = match &state.outbound {
                Some(outbound) => outbound.send(request).is_ok(),
                None => false,
            };
            if !sent {
                state.pending.pop_back();
                return Err(BridgeError::Disconnected);
            }
        }

        tracing::trace!(operation = %operation, "Request sent");
        response.await.map_err(|_| BridgeError::Disconnected)?
    }

    /// Settle the oldest pending request with `response`.
    ///
    /// Responses normally arrive through the channel given to
    /// [`Bridge::new`]; this is for transports that deliver them some other
    /// way.
    pub fn handle_response(&self, response: Response) {
        self.inner.settle(response);
    }

    /// Number of requests waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Whether requests can still be sent.
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().outbound.is_some()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        // closing the request channel lets the worker exit
        self.inner.state.lock().outbound = None;
        self.pump.abort();
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Bridge")
            .field("pending", &state.pending.len())
            .field("connected", &state.outbound.is_some())
            .finish()
    }
}
