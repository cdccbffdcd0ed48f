//! Message transport between a host and a worker.
//!
//! - [`channel`] builds the in-process, ordered, bidirectional queue pair.
//! - [`protocol`] defines the request and response envelopes.
//! - [`framing`] carries envelopes over byte streams (worker process stdio).
//! - [`HostGateway`] is the caller-side stub that correlates responses by id.
//! - [`WorkerProcess`] runs a worker in a separate process.

mod channel;
pub mod framing;
mod gateway;
mod process;
pub mod protocol;

pub use channel::{HostEnd, WorkerEnd, channel};
pub use gateway::{HostGateway, PendingResult};
pub use process::WorkerProcess;
pub use protocol::{Envelope, ExecutionRequest, ExecutionResult, Outcome, ProtocolError, RequestId};
