//! In-process message channel between a host and a worker.
//!
//! Two bounded mpsc queues carrying [`Envelope`]s, one per direction. Each
//! direction preserves send order; pairing requests with responses is left to
//! the `id` field.

use tokio::sync::mpsc;

use super::protocol::Envelope;

/// Host side: sends requests, receives responses.
#[derive(Debug)]
pub struct HostEnd {
    pub sender: mpsc::Sender<Envelope>,
    pub receiver: mpsc::Receiver<Envelope>,
}

/// Worker side: receives requests, sends responses.
#[derive(Debug)]
pub struct WorkerEnd {
    pub receiver: mpsc::Receiver<Envelope>,
    pub sender: mpsc::Sender<Envelope>,
}

/// Create a connected pair of channel ends, each direction bounded by `capacity`.
pub fn channel(capacity: usize) -> (HostEnd, WorkerEnd) {
    let capacity = capacity.max(1);
    let (request_tx, request_rx) = mpsc::channel(capacity);
    let (response_tx, response_rx) = mpsc::channel(capacity);
    (
        HostEnd {
            sender: request_tx,
            receiver: response_rx,
        },
        WorkerEnd {
            receiver: request_rx,
            sender: response_tx,
        },
    )
}
