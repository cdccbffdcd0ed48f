//! One-shot, memoized runtime bootstrap.
//!
//! The first caller moves the state to `InProgress` and spawns the acquisition;
//! every later caller attaches to the same readiness signal. The outcome,
//! success or failure, is cached for the lifetime of the worker.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use super::loader::RuntimeLoader;
use super::{InitStage, InitializationError, RuntimeHandle};

/// Shareable future resolving once the runtime is ready or has failed.
pub type ReadySignal = Shared<BoxFuture<'static, Result<RuntimeHandle, InitializationError>>>;

/// Bootstrap state. Transitions only forward:
/// `NotStarted -> InProgress -> {Ready | Failed}`.
pub enum InitializationState {
    NotStarted,
    InProgress(ReadySignal),
    Ready(RuntimeHandle),
    Failed(InitializationError),
}

impl InitializationState {
    pub fn phase(&self) -> InitPhase {
        match self {
            InitializationState::NotStarted => InitPhase::NotStarted,
            InitializationState::InProgress(_) => InitPhase::InProgress,
            InitializationState::Ready(_) => InitPhase::Ready,
            InitializationState::Failed(_) => InitPhase::Failed,
        }
    }
}

/// Payload-free view of [`InitializationState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    NotStarted,
    InProgress,
    Ready,
    Failed,
}

impl fmt::Display for InitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

enum Attach {
    Pending(ReadySignal),
    Settled(Result<RuntimeHandle, InitializationError>),
}

/// Bootstraps the runtime at most once.
///
/// Cloning is cheap; all clones share one state.
#[derive(Clone)]
pub struct Bootstrapper {
    inner: Arc<Inner>,
}

struct Inner {
    loader: Box<dyn RuntimeLoader>,
    state: Mutex<InitializationState>,
    /// Number of acquisitions started. Never exceeds one.
    acquisitions: AtomicUsize,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, InitializationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the acquisition outcome. Only the first call has any effect.
    fn settle(&self, result: &Result<RuntimeHandle, InitializationError>) {
        let mut state = self.lock();
        if !matches!(*state, InitializationState::InProgress(_)) {
            return;
        }
        *state = match result {
            Ok(handle) => {
                tracing::info!("runtime ready");
                InitializationState::Ready(handle.clone())
            }
            Err(err) => {
                tracing::error!("runtime bootstrap failed: {}", err);
                InitializationState::Failed(err.clone())
            }
        };
    }
}

impl Bootstrapper {
    pub fn new(loader: impl RuntimeLoader) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader: Box::new(loader),
                state: Mutex::new(InitializationState::NotStarted),
                acquisitions: AtomicUsize::new(0),
            }),
        }
    }

    /// Current bootstrap phase.
    pub fn phase(&self) -> InitPhase {
        self.inner.lock().phase()
    }

    /// How many times the underlying acquisition has been started.
    pub fn acquisitions(&self) -> usize {
        self.inner.acquisitions.load(Ordering::SeqCst)
    }

    /// Start bootstrapping without waiting for it.
    ///
    /// Must be called from within a Tokio runtime. Idempotent.
    pub fn begin(&self) {
        let _ = self.attach();
    }

    /// Wait for the runtime, starting the bootstrap if nobody has yet.
    ///
    /// Every caller observes the same outcome; a failure is returned to all
    /// past and future callers and is never retried.
    pub async fn initialize(&self) -> Result<RuntimeHandle, InitializationError> {
        let signal = match self.attach() {
            Attach::Pending(signal) => signal,
            Attach::Settled(result) => return result,
        };
        let result = signal.await;
        self.inner.settle(&result);
        result
    }

    fn attach(&self) -> Attach {
        let mut state = self.inner.lock();
        match &*state {
            InitializationState::Ready(handle) => Attach::Settled(Ok(handle.clone())),
            InitializationState::Failed(err) => Attach::Settled(Err(err.clone())),
            InitializationState::InProgress(signal) => Attach::Pending(signal.clone()),
            InitializationState::NotStarted => {
                // The signal is stored before the acquisition can make progress,
                // so concurrent callers attach to it instead of starting another.
                let signal = self.acquire();
                *state = InitializationState::InProgress(signal.clone());
                Attach::Pending(signal)
            }
        }
    }

    fn acquire(&self) -> ReadySignal {
        let attempt = self.inner.acquisitions.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(attempt, "bootstrapping runtime");

        let acquisition = self.inner.loader.acquire();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = acquisition.await.map(RuntimeHandle::new);
            inner.settle(&result);
            result
        });

        async move {
            task.await.unwrap_or_else(|err| {
                Err(InitializationError::new(
                    InitStage::Worker,
                    format!("bootstrap task failed: {err}"),
                ))
            })
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{Interpreter, Session};
    use std::time::Duration;

    fn counting_loader(
        counter: Arc<AtomicUsize>,
        delay: Duration,
        fail: bool,
    ) -> impl RuntimeLoader {
        move || -> BoxFuture<'static, Result<Box<dyn Interpreter>, InitializationError>> {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                if fail {
                    return Err(InitializationError::new(InitStage::Assets, "offline"));
                }
                Ok(Box::new(Session::new()) as Box<dyn Interpreter>)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_acquisition() {
        let counter = Arc::new(AtomicUsize::new(0));
        let bootstrapper =
            Bootstrapper::new(counting_loader(counter.clone(), Duration::from_millis(20), false));
        assert_eq!(bootstrapper.phase(), InitPhase::NotStarted);

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let b = bootstrapper.clone();
                tokio::spawn(async move { b.initialize().await.is_ok() })
            })
            .collect();
        for waiter in waiters {
            assert!(waiter.await.unwrap());
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(bootstrapper.acquisitions(), 1);
        assert_eq!(bootstrapper.phase(), InitPhase::Ready);
    }

    #[tokio::test]
    async fn test_begin_is_idempotent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let bootstrapper =
            Bootstrapper::new(counting_loader(counter.clone(), Duration::from_millis(5), false));
        bootstrapper.begin();
        bootstrapper.begin();
        assert_eq!(bootstrapper.phase(), InitPhase::InProgress);
        bootstrapper.initialize().await.unwrap();
        bootstrapper.begin();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_cached() {
        let counter = Arc::new(AtomicUsize::new(0));
        let bootstrapper =
            Bootstrapper::new(counting_loader(counter.clone(), Duration::ZERO, true));

        let first = bootstrapper.initialize().await.unwrap_err();
        let second = bootstrapper.initialize().await.unwrap_err();
        assert_eq!(first, second);
        assert_eq!(first.stage, InitStage::Assets);
        assert_eq!(bootstrapper.phase(), InitPhase::Failed);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_eager_start_settles_without_waiters() {
        let counter = Arc::new(AtomicUsize::new(0));
        let bootstrapper =
            Bootstrapper::new(counting_loader(counter.clone(), Duration::ZERO, false));
        bootstrapper.begin();
        for _ in 0..100 {
            if bootstrapper.phase() == InitPhase::Ready {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(bootstrapper.phase(), InitPhase::Ready);
    }
}
