//! The worker message loop.

use std::collections::VecDeque;

use futures::FutureExt;
use futures::future::{BoxFuture, OptionFuture};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::RuntimeConfig;
use crate::error::Error;
use crate::ipc::framing::DEFAULT_MAX_FRAME_LEN;
use crate::ipc::{
    Envelope, ExecutionRequest, ExecutionResult, HostGateway, RequestId, WorkerEnd, channel,
};

use super::{Bootstrapper, BuiltinLoader, ExecutionSerializer, RequestPhase, RuntimeLoader};

/// Counters reported when a worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Requests admitted to the pending queue.
    pub accepted: u64,
    /// Requests that produced a value.
    pub completed: u64,
    /// Requests that produced an error outcome.
    pub failed: u64,
    /// Messages rejected as malformed or duplicate.
    pub rejected: u64,
}

enum Job {
    Execute(ExecutionRequest),
    /// A protocol reject answered in queue order.
    Reject(ExecutionResult),
}

/// A single worker: one interpreter, one pending queue, one request at a time.
pub struct Worker {
    serializer: ExecutionSerializer,
    eager: bool,
    max_result_len: usize,
}

impl Worker {
    /// Worker backed by the built-in interpreter and the configured packages.
    pub fn new(config: &RuntimeConfig) -> Self {
        Self::with_loader(
            BuiltinLoader::new(config.packages.iter().cloned()),
            config.eager_bootstrap,
        )
        .with_max_result_len(config.max_frame_len)
    }

    /// Worker backed by a custom loader.
    pub fn with_loader(loader: impl RuntimeLoader, eager: bool) -> Self {
        Self {
            serializer: ExecutionSerializer::new(Bootstrapper::new(loader)),
            eager,
            max_result_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Largest encoded response; bigger results are replaced by an error.
    pub fn with_max_result_len(mut self, len: usize) -> Self {
        self.max_result_len = len;
        self
    }

    pub fn bootstrapper(&self) -> &Bootstrapper {
        self.serializer.bootstrapper()
    }

    /// Run the worker on an in-process channel, returning the host's gateway.
    pub fn spawn(self, capacity: usize) -> (HostGateway, JoinHandle<WorkerStats>) {
        let (host, worker) = channel(capacity);
        let task = tokio::spawn(self.run(worker));
        (HostGateway::connect(host), task)
    }

    /// Serve requests until the inbound side closes and the queue is drained,
    /// or until the host stops listening.
    ///
    /// New messages are accepted while a request is executing; results leave
    /// in acceptance order.
    pub async fn run(self, end: WorkerEnd) -> WorkerStats {
        let WorkerEnd {
            mut receiver,
            sender,
        } = end;

        if self.eager {
            self.bootstrapper().begin();
        }

        let mut queue: VecDeque<Job> = VecDeque::new();
        // Ids queued or executing.
        let mut active: FxHashSet<RequestId> = FxHashSet::default();
        let mut in_flight: OptionFuture<BoxFuture<'static, ExecutionResult>> = None.into();
        let mut busy = false;
        let mut inbound_open = true;
        let mut stats = WorkerStats::default();

        'serve: loop {
            while !busy {
                match queue.pop_front() {
                    Some(Job::Execute(request)) => {
                        let serializer = self.serializer.clone();
                        in_flight = Some(async move { serializer.handle(request).await }.boxed()).into();
                        busy = true;
                    }
                    Some(Job::Reject(result)) => {
                        active.remove(&result.id);
                        if !emit(&sender, result).await {
                            break 'serve;
                        }
                    }
                    None => break,
                }
            }

            if !inbound_open && !busy {
                break;
            }

            tokio::select! {
                message = receiver.recv(), if inbound_open => match message {
                    Some(envelope) => accept(envelope, &mut queue, &mut active, &mut stats),
                    None => {
                        tracing::debug!("inbound channel closed, draining {} queued request(s)", queue.len());
                        inbound_open = false;
                    }
                },
                Some(result) = &mut in_flight, if busy => {
                    in_flight = None.into();
                    busy = false;
                    active.remove(&result.id);
                    let result = self.bounded(result);
                    if result.outcome.is_error() {
                        stats.failed += 1;
                    } else {
                        stats.completed += 1;
                    }
                    if !emit(&sender, result).await {
                        break;
                    }
                },
                _ = sender.closed() => {
                    tracing::warn!("Host stopped listening, abandoning {} queued request(s)", queue.len());
                    break;
                },
            }
        }

        tracing::info!(
            accepted = stats.accepted,
            completed = stats.completed,
            failed = stats.failed,
            rejected = stats.rejected,
            "worker exiting"
        );
        stats
    }

    /// Replace a result whose response would not fit in one frame.
    fn bounded(&self, result: ExecutionResult) -> ExecutionResult {
        let len = match serde_json::to_vec(&result) {
            Ok(bytes) => bytes.len(),
            Err(e) => {
                return ExecutionResult::error(result.id, format!("result is not encodable: {e}"));
            }
        };
        if len <= self.max_result_len {
            return result;
        }
        tracing::warn!(id = %result.id, len, "result exceeds {} bytes", self.max_result_len);
        ExecutionResult::error(
            result.id,
            format!(
                "result too large: {len} bytes encoded (limit {})",
                self.max_result_len
            ),
        )
    }
}

fn accept(
    envelope: Envelope,
    queue: &mut VecDeque<Job>,
    active: &mut FxHashSet<RequestId>,
    stats: &mut WorkerStats,
) {
    match ExecutionRequest::from_envelope(envelope) {
        Ok(request) => {
            if active.contains(&request.id) {
                tracing::warn!("Dropping request with duplicate in-flight id {}", request.id);
                stats.rejected += 1;
                return;
            }
            tracing::debug!(id = %request.id, phase = %RequestPhase::Queued, position = queue.len(), "request phase");
            active.insert(request.id.clone());
            stats.accepted += 1;
            queue.push_back(Job::Execute(request));
        }
        Err(err) => {
            stats.rejected += 1;
            match err.id.clone() {
                Some(id) if !active.contains(&id) => {
                    tracing::warn!("Rejecting request {}: {}", id, err);
                    // Held until the reject is sent so the id cannot be answered twice.
                    active.insert(id.clone());
                    queue.push_back(Job::Reject(ExecutionResult::error(
                        id,
                        Error::Protocol(err).to_string(),
                    )));
                }
                _ => tracing::warn!("Dropping malformed message: {}", err),
            }
        }
    }
}

/// Send one result. Returns `false` once the host has gone away.
async fn emit(sender: &mpsc::Sender<Envelope>, result: ExecutionResult) -> bool {
    if sender.send(result.to_envelope()).await.is_err() {
        tracing::warn!("Host stopped listening, dropping result for {}", result.id);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{Interpreter, Session};
    use crate::ipc::Outcome;
    use crate::runtime::InitializationError;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    #[tokio::test]
    async fn test_worker_answers_in_order() {
        let (gateway, task) = Worker::new(&RuntimeConfig::default()).spawn(8);
        let a = gateway.submit("x = 2").await.unwrap();
        let b = gateway.submit("x * 21").await.unwrap();
        assert_eq!(a.outcome().await.unwrap(), Outcome::Value(json!(null)));
        assert_eq!(b.outcome().await.unwrap(), Outcome::Value(json!(42)));

        drop(gateway);
        let stats = task.await.unwrap();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.completed, 2);
    }

    #[tokio::test]
    async fn test_drains_queue_after_inbound_closes() {
        let (host, worker_end) = channel(8);
        let task = tokio::spawn(Worker::new(&RuntimeConfig::default()).run(worker_end));
        let crate::ipc::HostEnd {
            sender,
            mut receiver,
        } = host;

        for (id, src) in [("1", "a = 1"), ("2", "a + 1"), ("3", "a + 2")] {
            sender.send(json!({ "id": id, "src": src })).await.unwrap();
        }
        drop(sender);

        let mut seen = Vec::new();
        while let Some(envelope) = receiver.recv().await {
            seen.push(envelope);
        }
        assert_eq!(
            seen,
            vec![
                json!({ "id": "1", "res": null }),
                json!({ "id": "2", "res": 2 }),
                json!({ "id": "3", "res": 3 }),
            ]
        );
        assert_eq!(task.await.unwrap().completed, 3);
    }

    #[tokio::test]
    async fn test_rejected_id_is_not_answered_twice() {
        let gate = Arc::new(Semaphore::new(0));
        let loader = {
            let gate = Arc::clone(&gate);
            move || -> BoxFuture<'static, Result<Box<dyn Interpreter>, InitializationError>> {
                let gate = Arc::clone(&gate);
                async move {
                    let _ = gate.acquire().await;
                    Ok(Box::new(Session::new()) as Box<dyn Interpreter>)
                }
                .boxed()
            }
        };
        let (host, worker_end) = channel(8);
        let task = tokio::spawn(Worker::with_loader(loader, true).run(worker_end));
        let crate::ipc::HostEnd {
            sender,
            mut receiver,
        } = host;

        // The first request holds the queue until the runtime is released.
        sender.send(json!({ "id": "a", "src": "1" })).await.unwrap();
        sender.send(json!({ "id": "r", "src": 1 })).await.unwrap();
        sender.send(json!({ "id": "r", "src": "2" })).await.unwrap();
        drop(sender);
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.add_permits(1);

        let mut seen = Vec::new();
        while let Some(envelope) = receiver.recv().await {
            seen.push(envelope);
        }
        assert_eq!(seen.len(), 2, "{seen:?}");
        assert_eq!(seen[0], json!({ "id": "a", "res": 1 }));
        assert_eq!(seen[1]["id"], json!("r"));
        assert!(seen[1]["error"].as_str().unwrap().contains("`src` must be a string"));
        assert_eq!(task.await.unwrap().rejected, 2);
    }

    #[tokio::test]
    async fn test_oversized_result_is_replaced_by_error() {
        let worker = Worker::new(&RuntimeConfig::default()).with_max_result_len(96);
        let (gateway, _task) = worker.spawn(8);
        let outcome = gateway.execute("'x' * 100").await.unwrap();
        let message = outcome.into_result().unwrap_err();
        assert!(message.starts_with("result too large"), "{message}");
        assert_eq!(gateway.execute("'x' * 10").await.unwrap(), Outcome::Value(json!("xxxxxxxxxx")));
    }

    #[tokio::test]
    async fn test_lazy_worker_does_not_bootstrap_until_asked() {
        let worker = Worker::new(&RuntimeConfig::default().with_eager_bootstrap(false));
        let bootstrapper = worker.bootstrapper().clone();
        let (gateway, _task) = worker.spawn(8);
        tokio::task::yield_now().await;
        assert_eq!(bootstrapper.acquisitions(), 0);

        gateway.execute("1").await.unwrap();
        assert_eq!(bootstrapper.acquisitions(), 1);
    }
}
