//! Callback shapes shared by lifecycle handlers, interceptors, controller
//! initializers and event listeners.
//!
//! A handler is either synchronous (returns its result) or takes a
//! [`Completion`] it must settle exactly once. Dropping the completion
//! without settling it means the callee gave up; holding it forever stalls
//! whoever awaits it, which the [`Watchdog`] reports.

use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use tokio::sync::oneshot;
use tracing::warn;

pub const DEFAULT_WATCHDOG: Duration = Duration::from_secs(5);

pub type SyncFn<A> = dyn Fn(A) -> Result<()> + Send + Sync;
pub type AsyncFn<A> = dyn Fn(A, Completion) + Send + Sync;

pub enum Handler<A> {
    Sync(Arc<SyncFn<A>>),
    Async(Arc<AsyncFn<A>>),
}

impl<A> Clone for Handler<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

impl<A> fmt::Debug for Handler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Handler::Sync"),
            Self::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

impl<A: Send + 'static> Handler<A> {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(A) -> Result<()> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    pub fn with_completion<F>(f: F) -> Self
    where
        F: Fn(A, Completion) + Send + Sync + 'static,
    {
        Self::Async(Arc::new(f))
    }

    /// Runs `f` as a spawned task and settles the completion with its output.
    /// Must be invoked from within a tokio runtime.
    pub fn task<F, Fut>(f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::with_completion(move |arg, completion| {
            let work = f(arg);
            tokio::spawn(async move { completion.finish(work.await) });
        })
    }

    pub async fn invoke(&self, arg: A, watchdog: &Watchdog, label: &str) -> Settled {
        match self {
            Self::Sync(f) => Settled::Completed(f(arg)),
            Self::Async(f) => {
                let (completion, settled) = Completion::channel();
                f(arg, completion);
                watchdog.supervise(label, settled).await
            }
        }
    }
}

/// One-shot completion handed to asynchronous handlers.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<Result<()>>,
}

impl Completion {
    pub fn channel() -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn done(self) {
        self.finish(Ok(()));
    }

    pub fn fail(self, err: impl Into<anyhow::Error>) {
        self.finish(Err(err.into()));
    }

    pub fn finish(self, result: Result<()>) {
        // the waiter may already be gone when its transition was superseded
        let _ = self.tx.send(result);
    }
}

#[derive(Debug)]
pub enum Settled {
    Completed(Result<()>),
    /// The completion was dropped without being settled.
    Abandoned,
}

/// Reports asynchronous callbacks that have not settled within a window.
/// The wait itself is never cut short.
#[derive(Debug, Clone)]
pub struct Watchdog {
    window: Duration,
    slow_callbacks: Arc<AtomicU64>,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(DEFAULT_WATCHDOG)
    }
}

impl Watchdog {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slow_callbacks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of callbacks that outlived the window so far.
    pub fn slow_callbacks(&self) -> u64 {
        self.slow_callbacks.load(Ordering::Relaxed)
    }

    pub async fn supervise(&self, label: &str, mut settled: oneshot::Receiver<Result<()>>) -> Settled {
        let timer = tokio::time::sleep(self.window);
        tokio::pin!(timer);

        tokio::select! {
            result = &mut settled => return Self::settle(result),
            _ = &mut timer => {
                self.slow_callbacks.fetch_add(1, Ordering::Relaxed);
                warn!(
                    callback = label,
                    window_ms = self.window.as_millis() as u64,
                    "nav: callback still pending after watchdog window, did it forget its completion?"
                );
            }
        }

        Self::settle(settled.await)
    }

    fn settle(result: Result<Result<()>, oneshot::error::RecvError>) -> Settled {
        match result {
            Ok(outcome) => Settled::Completed(outcome),
            Err(_) => Settled::Abandoned,
        }
    }
}

#[cfg(test)]
#[path = "tests/handler_tests.rs"]
mod tests;
