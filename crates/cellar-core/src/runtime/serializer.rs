//! Execution of a single request against the shared runtime.

use std::fmt;

use crate::error::Error;
use crate::ipc::{ExecutionRequest, ExecutionResult};

use super::Bootstrapper;

/// Per-request lifecycle: `Queued -> AwaitingRuntime -> Executing -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Queued,
    AwaitingRuntime,
    Executing,
    Completed,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Runs requests against the runtime owned by a [`Bootstrapper`].
///
/// `handle` itself does not queue; the [`Worker`](super::Worker) guarantees
/// that at most one call is in flight.
#[derive(Clone)]
pub struct ExecutionSerializer {
    bootstrapper: Bootstrapper,
}

impl ExecutionSerializer {
    pub fn new(bootstrapper: Bootstrapper) -> Self {
        Self { bootstrapper }
    }

    pub fn bootstrapper(&self) -> &Bootstrapper {
        &self.bootstrapper
    }

    /// Produce the result for one request.
    ///
    /// Readiness is checked on every request, including when the runtime is
    /// already up. Faults never escape; they become `Error` outcomes.
    pub async fn handle(&self, request: ExecutionRequest) -> ExecutionResult {
        let ExecutionRequest { id, source } = request;

        tracing::debug!(id = %id, phase = %RequestPhase::AwaitingRuntime, "request phase");
        let runtime = match self.bootstrapper.initialize().await {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::debug!(id = %id, phase = %RequestPhase::Completed, "request phase");
                return ExecutionResult::error(id, Error::Initialization(err).to_string());
            }
        };

        tracing::debug!(id = %id, phase = %RequestPhase::Executing, "request phase");
        let result = match runtime.execute(source).await {
            Ok(value) => ExecutionResult::value(id, value.to_json()),
            Err(fault) => {
                tracing::debug!(id = %id, "execution fault: {}", fault);
                ExecutionResult::error(id, fault.to_string())
            }
        };

        tracing::debug!(id = %result.id, phase = %RequestPhase::Completed, "request phase");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Interpreter;
    use crate::ipc::{Outcome, RequestId};
    use crate::runtime::{BuiltinLoader, InitStage, InitializationError};
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use serde_json::json;

    fn request(id: &str, source: &str) -> ExecutionRequest {
        ExecutionRequest::new(RequestId::new(id), source)
    }

    #[tokio::test]
    async fn test_values_and_faults() {
        let serializer = ExecutionSerializer::new(Bootstrapper::new(BuiltinLoader::default()));

        let result = serializer.handle(request("a", "x = 5")).await;
        assert_eq!(result.id, RequestId::new("a"));
        assert_eq!(result.outcome, Outcome::Value(json!(null)));

        let result = serializer.handle(request("b", "x + 1")).await;
        assert_eq!(result.outcome, Outcome::Value(json!(6)));

        let result = serializer.handle(request("c", "1/0")).await;
        match result.outcome {
            Outcome::Error(message) => assert!(message.starts_with("ZeroDivisionError")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_initialization_failure_is_reported() {
        let loader = || -> BoxFuture<'static, Result<Box<dyn Interpreter>, InitializationError>> {
            async { Err(InitializationError::new(InitStage::Assets, "no assets")) }.boxed()
        };
        let serializer = ExecutionSerializer::new(Bootstrapper::new(loader));

        for id in ["1", "2"] {
            let result = serializer.handle(request(id, "1 + 1")).await;
            let message = result.outcome.into_result().unwrap_err();
            assert!(message.contains("no assets"), "{message}");
            assert!(message.starts_with("initialization failed"), "{message}");
        }
    }
}
