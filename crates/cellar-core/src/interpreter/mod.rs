//! Embedded interpreter for cellar snippets.
//!
//! The runtime only depends on the [`Interpreter`] trait. The built-in
//! implementation, [`Session`], evaluates a small Python-flavoured expression
//! language whose bindings persist across calls:
//!
//! ```
//! use cellar_core::interpreter::{Interpreter, Session, Value};
//!
//! let mut session = Session::new();
//! assert_eq!(session.evaluate("x = 5").unwrap(), Value::None);
//! assert_eq!(session.evaluate("x + 1").unwrap(), Value::Int(6));
//! ```

mod builtins;
pub mod lexer;
pub mod packages;
pub mod parser;
mod session;
mod value;

use std::fmt;

pub use packages::Package;
pub use session::Session;
pub use value::{MAX_NESTING, Value};

/// An interpreter instance holding session-scoped state.
///
/// Implementors are driven by exactly one caller at a time; state left behind by
/// one call (bindings, loaded packages) must be visible to the next.
pub trait Interpreter: Send + 'static {
    /// Evaluate a source text, returning the value of its final expression
    /// statement or [`Value::None`] if there is none.
    fn evaluate(&mut self, source: &str) -> Result<Value, ExecutionFault>;

    /// Make an extension package available to later calls.
    fn load_package(&mut self, name: &str) -> Result<(), ExecutionFault>;
}

/// Category of an execution fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    SyntaxError,
    NameError,
    TypeError,
    ValueError,
    IndexError,
    ZeroDivisionError,
    OverflowError,
    ImportError,
    /// The interpreter itself panicked.
    InternalError,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A fault raised while evaluating a snippet.
///
/// Faults are scoped to the request that raised them; the session stays usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ExecutionFault {
    pub kind: FaultKind,
    pub message: String,
}

impl ExecutionFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(FaultKind::SyntaxError, message)
    }

    pub fn name(name: &str) -> Self {
        Self::new(FaultKind::NameError, format!("name '{name}' is not defined"))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::TypeError, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ValueError, message)
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(FaultKind::IndexError, message)
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ZeroDivisionError, message)
    }

    pub fn overflow() -> Self {
        Self::new(FaultKind::OverflowError, "integer result out of range")
    }
}
