//! Acquisition of the interpreter and its extension packages.

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::interpreter::{Interpreter, Session};

use super::{InitStage, InitializationError};

/// Performs the single acquisition side effect of a bootstrap.
///
/// The returned future must own everything it needs; it is driven on a
/// spawned task.
pub trait RuntimeLoader: Send + Sync + 'static {
    fn acquire(&self) -> BoxFuture<'static, Result<Box<dyn Interpreter>, InitializationError>>;
}

impl<F> RuntimeLoader for F
where
    F: Fn() -> BoxFuture<'static, Result<Box<dyn Interpreter>, InitializationError>>
        + Send
        + Sync
        + 'static,
{
    fn acquire(&self) -> BoxFuture<'static, Result<Box<dyn Interpreter>, InitializationError>> {
        self()
    }
}

/// Loads the built-in [`Session`] and the configured packages, in order.
#[derive(Debug, Clone, Default)]
pub struct BuiltinLoader {
    packages: Vec<String>,
}

impl BuiltinLoader {
    pub fn new(packages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            packages: packages.into_iter().map(Into::into).collect(),
        }
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }
}

impl RuntimeLoader for BuiltinLoader {
    fn acquire(&self) -> BoxFuture<'static, Result<Box<dyn Interpreter>, InitializationError>> {
        let packages = self.packages.clone();
        async move {
            let mut session = Session::new();
            for package in &packages {
                if let Err(fault) = session.load_package(package) {
                    return Err(InitializationError::new(
                        InitStage::Packages,
                        format!("{package}: {}", fault.message),
                    ));
                }
                tracing::debug!(package = %package, "extension package loaded");
            }
            Ok(Box::new(session) as Box<dyn Interpreter>)
        }
        .boxed()
    }
}
