//! Isolated, lazily bootstrapped, order-preserving execution of snippets.
//!
//! A [`Worker`] owns one embedded interpreter. The interpreter is acquired
//! exactly once by the [`Bootstrapper`], then every request is run against it
//! strictly in arrival order by the [`ExecutionSerializer`]. Callers talk to
//! the worker through a [`HostGateway`], either over an in-process channel or
//! over the stdio of a [`WorkerProcess`].
//!
//! ```no_run
//! use cellar_core::{RuntimeConfig, Worker};
//!
//! # async fn demo() -> cellar_core::Result<()> {
//! let config = RuntimeConfig::default().with_packages(["math"]);
//! let (gateway, _worker) = Worker::new(&config).spawn(config.channel_capacity);
//! gateway.execute("r = 2").await?;
//! let area = gateway.execute("math.pi * r ** 2").await?;
//! println!("{area}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod interpreter;
pub mod ipc;
pub mod runtime;

pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use interpreter::{ExecutionFault, FaultKind, Interpreter, Session, Value};
pub use ipc::{
    ExecutionRequest, ExecutionResult, HostGateway, Outcome, PendingResult, ProtocolError,
    RequestId, WorkerProcess,
};
pub use runtime::{
    Bootstrapper, BuiltinLoader, ExecutionSerializer, InitPhase, InitStage, InitializationError,
    RuntimeHandle, RuntimeLoader, Worker, WorkerStats,
};
