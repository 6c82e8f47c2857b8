//! Async-to-sync bridge.
//!
//! Every engine operation completes through a single-shot [`Completion`].
//! [`wait`] turns such an operation into a blocking call with a bounded
//! wait, and [`future`] into something an async caller can `.await`.
//! Neither blocks the delivery path: only the waiting caller is parked.

use crate::error::EngineError;
use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Single-shot completion callback.
///
/// Consumed on use, so an operation can deliver at most one result.
pub struct Completion<T> {
    callback: Box<dyn FnOnce(T) + Send>,
}

impl<T: 'static> Completion<T> {
    /// Wraps a callback.
    pub fn new(callback: impl FnOnce(T) + Send + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Delivers the result.
    pub fn complete(self, value: T) {
        (self.callback)(value)
    }

    /// Adapts the completion to accept a different result type.
    pub fn map<U>(self, f: impl FnOnce(U) -> T + Send + 'static) -> Completion<U>
    where
        U: 'static,
    {
        Completion::new(move |value| self.complete(f(value)))
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Completion")
    }
}

/// Why a bridged wait returned without a result.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// No result arrived within the deadline.
    #[error("no result within {0:?}")]
    Timeout(Duration),

    /// The operation dropped its completion without delivering a result.
    #[error("operation dropped its completion")]
    Abandoned,
}

impl From<WaitError> for EngineError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Timeout(_) => Self::TimedOut,
            WaitError::Abandoned => Self::Cancelled,
        }
    }
}

/// Starts an operation and blocks until it completes or `timeout` elapses.
///
/// A result delivered after the deadline is discarded.
pub fn wait<T, F>(timeout: Duration, start: F) -> Result<T, WaitError>
where
    T: Send + 'static,
    F: FnOnce(Completion<T>),
{
    let (tx, rx) = mpsc::sync_channel(1);
    start(Completion::new(move |value| {
        // The receiver is gone once the wait has returned.
        let _ = tx.send(value);
    }));

    rx.recv_timeout(timeout).map_err(|err| match err {
        mpsc::RecvTimeoutError::Timeout => WaitError::Timeout(timeout),
        mpsc::RecvTimeoutError::Disconnected => WaitError::Abandoned,
    })
}

/// Future resolving to an operation's result.
#[derive(Debug)]
pub struct CompletionFuture<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for CompletionFuture<T> {
    type Output = Result<T, WaitError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| WaitError::Abandoned))
    }
}

/// Starts an operation and returns a future for its result.
pub fn future<T, F>(start: F) -> CompletionFuture<T>
where
    T: Send + 'static,
    F: FnOnce(Completion<T>),
{
    let (tx, rx) = oneshot::channel();
    start(Completion::new(move |value| {
        let _ = tx.send(value);
    }));
    CompletionFuture { rx }
}
