//! Error types for cellar-core.

use thiserror::Error;

use crate::interpreter::ExecutionFault;
use crate::ipc::ProtocolError;
use crate::runtime::InitializationError;

/// Result type for cellar-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cellar-core.
#[derive(Debug, Error)]
pub enum Error {
    /// The runtime could not be bootstrapped. Persistent for the worker's lifetime.
    #[error("initialization failed: {0}")]
    Initialization(#[from] InitializationError),

    /// A submitted snippet failed during evaluation.
    #[error("execution fault: {0}")]
    Execution(#[from] ExecutionFault),

    /// Malformed or uncorrelated message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// IPC communication error with a worker process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// The worker went away before answering.
    #[error("worker channel closed")]
    ChannelClosed,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Render the error together with a recovery hint, for display in the CLI.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::Initialization(_) => {
                "the worker cannot recover from a failed bootstrap; check the package list and restart it"
            }
            Error::Execution(_) => "fix the snippet and submit it again; the session is still usable",
            Error::Protocol(_) => "every request needs a unique string `id` and a string `src`",
            Error::Ipc(_) => "set CELLAR_WORKER_PATH or run without --isolated",
            Error::ChannelClosed => "the worker exited; run with -v to see its log",
            Error::Config(_) => "check the CELLAR_* environment variables",
            Error::Serialization(_) | Error::Io(_) => return self.to_string(),
        };
        format!("{self}\n  hint: {hint}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_is_appended() {
        let err = Error::Protocol(ProtocolError::new(None, "missing `id`"));
        let rendered = err.with_hint();
        assert!(rendered.starts_with("protocol error: missing `id`"));
        assert!(rendered.contains("hint:"));
    }

    #[test]
    fn test_io_has_no_hint() {
        let err = Error::Io(std::io::Error::other("boom"));
        assert_eq!(err.with_hint(), "IO error: boom");
    }
}
