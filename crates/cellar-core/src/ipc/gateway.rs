//! Caller-side stub: posts requests and routes responses back by id.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

use super::channel::HostEnd;
use super::protocol::{Envelope, ExecutionRequest, ExecutionResult, Outcome, ProtocolError, RequestId};

#[derive(Default)]
struct Pending {
    /// Set once the response stream has ended; no new waiters are accepted.
    closed: bool,
    waiters: FxHashMap<RequestId, oneshot::Sender<Outcome>>,
}

type SharedPending = Arc<Mutex<Pending>>;

fn lock(pending: &SharedPending) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Host-side handle to a worker.
///
/// Requests may be pipelined: any number can be submitted before their results
/// are awaited. Must be created inside a Tokio runtime.
pub struct HostGateway {
    sender: mpsc::Sender<Envelope>,
    pending: SharedPending,
    router: JoinHandle<()>,
}

impl HostGateway {
    /// Take over the host end of a channel and start routing its responses.
    pub fn connect(end: HostEnd) -> Self {
        let HostEnd { sender, receiver } = end;
        let pending = SharedPending::default();
        let router = tokio::spawn(route_responses(receiver, Arc::clone(&pending)));
        Self {
            sender,
            pending,
            router,
        }
    }

    /// Submit `source` under a fresh id without waiting for its result.
    pub async fn submit(&self, source: impl Into<String>) -> Result<PendingResult> {
        self.submit_request(ExecutionRequest::new(RequestId::generate(), source))
            .await
    }

    /// Submit a request with a caller-chosen id.
    ///
    /// Fails with a protocol error if a request with the same id is still
    /// awaiting its result.
    pub async fn submit_request(&self, request: ExecutionRequest) -> Result<PendingResult> {
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(Error::ChannelClosed);
            }
            if pending.waiters.contains_key(&id) {
                return Err(Error::Protocol(ProtocolError::new(
                    Some(id),
                    "a request with this id is already pending",
                )));
            }
            // Registered before sending so a fast response always finds its waiter.
            pending.waiters.insert(id.clone(), tx);
        }

        tracing::debug!(id = %id, "submitting request");
        if self.sender.send(request.to_envelope()).await.is_err() {
            lock(&self.pending).waiters.remove(&id);
            return Err(Error::ChannelClosed);
        }

        Ok(PendingResult { id, rx })
    }

    /// Submit `source` and wait for its outcome.
    pub async fn execute(&self, source: impl Into<String>) -> Result<Outcome> {
        self.submit(source).await?.outcome().await
    }

    /// Send an arbitrary envelope, bypassing id bookkeeping.
    pub async fn send_raw(&self, envelope: Envelope) -> Result<()> {
        self.sender
            .send(envelope)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Number of submitted requests still awaiting a result.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).waiters.len()
    }
}

impl Drop for HostGateway {
    fn drop(&mut self) {
        self.router.abort();
    }
}

async fn route_responses(mut receiver: mpsc::Receiver<Envelope>, pending: SharedPending) {
    while let Some(envelope) = receiver.recv().await {
        let result = match ExecutionResult::from_envelope(envelope) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Dropping response: {}", e);
                continue;
            }
        };

        let waiter = lock(&pending).waiters.remove(&result.id);
        match waiter {
            // The caller may have dropped its PendingResult; that is not an error.
            Some(tx) => {
                let _ = tx.send(result.outcome);
            }
            None => tracing::warn!("Dropping response for unknown request id {}", result.id),
        }
    }

    let mut pending = lock(&pending);
    pending.closed = true;
    if !pending.waiters.is_empty() {
        tracing::warn!(
            "Worker channel closed with {} request(s) pending",
            pending.waiters.len()
        );
    }
    // Dropping the senders wakes every waiter with ChannelClosed.
    pending.waiters.clear();
}

/// A submitted request whose result has not been consumed yet.
#[derive(Debug)]
pub struct PendingResult {
    id: RequestId,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingResult {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Wait for the worker's answer.
    pub async fn outcome(self) -> Result<Outcome> {
        self.rx.await.map_err(|_| Error::ChannelClosed)
    }
}
