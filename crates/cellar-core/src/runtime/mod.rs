//! Runtime bootstrap and serialized execution.
//!
//! - [`Bootstrapper`] acquires the interpreter exactly once per worker.
//! - [`ExecutionSerializer`] runs one request at a time against it.
//! - [`Worker`] owns the pending queue and the message loop.

mod bootstrap;
mod loader;
mod serializer;
mod worker;

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::interpreter::{ExecutionFault, FaultKind, Interpreter, Value};

pub use bootstrap::{Bootstrapper, InitPhase, InitializationState, ReadySignal};
pub use loader::{BuiltinLoader, RuntimeLoader};
pub use serializer::{ExecutionSerializer, RequestPhase};
pub use worker::{Worker, WorkerStats};

/// Step of the bootstrap that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    /// Creating the interpreter itself.
    Assets,
    /// Loading an extension package.
    Packages,
    /// The bootstrap task died before reporting.
    Worker,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InitStage::Assets => "asset acquisition",
            InitStage::Packages => "package loading",
            InitStage::Worker => "bootstrap task",
        })
    }
}

/// Cause of a failed bootstrap, cached and handed to every request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage} failed: {message}")]
pub struct InitializationError {
    pub stage: InitStage,
    pub message: String,
}

impl InitializationError {
    pub fn new(stage: InitStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Opaque capability for the live interpreter.
///
/// Clones refer to the same interpreter. Calls are serialized by the
/// [`ExecutionSerializer`]; the lock only backs that discipline up.
#[derive(Clone)]
pub struct RuntimeHandle {
    interpreter: Arc<Mutex<Box<dyn Interpreter>>>,
}

impl RuntimeHandle {
    pub(crate) fn new(interpreter: Box<dyn Interpreter>) -> Self {
        Self {
            interpreter: Arc::new(Mutex::new(interpreter)),
        }
    }

    /// Evaluate `source` on the blocking pool so the caller's loop stays free.
    ///
    /// A panic inside the interpreter becomes an `InternalError` fault.
    pub(crate) async fn execute(&self, source: String) -> Result<Value, ExecutionFault> {
        let interpreter = Arc::clone(&self.interpreter);
        let joined = tokio::task::spawn_blocking(move || {
            let mut interpreter = interpreter.blocking_lock();
            interpreter.evaluate(&source)
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => {
                let payload = err.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ExecutionFault::new(
                    FaultKind::InternalError,
                    format!("interpreter panicked: {message}"),
                ))
            }
            Err(err) => Err(ExecutionFault::new(
                FaultKind::InternalError,
                format!("evaluation was cancelled: {err}"),
            )),
        }
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle").finish_non_exhaustive()
    }
}
