//! Timer seam.
//!
//! Deadlines are always relative to the last activity of an exchange:
//! every re-arm schedules a fresh timer and cancels the previous one.

use std::time::{Duration, Instant};

/// Work run when a timer expires.
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// Cancels a scheduled timer.
///
/// Dropping the handle leaves the timer running.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    /// Creates a handle that runs `cancel` when cancelled.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Creates a handle that cannot cancel anything.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Cancels the timer. Cancelling an expired timer is a no-op.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Source of time and one-shot timers.
pub trait Timer: Send + Sync {
    /// Current time.
    fn now(&self) -> Instant;

    /// Runs `callback` once `after` has elapsed.
    ///
    /// Callbacks must be short and non-blocking; they run on the timer's
    /// own context.
    fn schedule(&self, after: Duration, callback: TimerCallback) -> TimerHandle;
}

/// Timer service backed by a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioTimer {
    handle: tokio::runtime::Handle,
}

impl TokioTimer {
    /// Creates a timer service spawning on `handle`.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a timer service for the runtime the caller is running in.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Timer for TokioTimer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(&self, after: Duration, callback: TimerCallback) -> TimerHandle {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(after).await;
            callback();
        });
        TimerHandle::new(move || task.abort())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap()
    }

    #[test]
    fn tokio_timer_fires() {
        let rt = runtime();
        let timer = TokioTimer::new(rt.handle().clone());
        let (tx, rx) = mpsc::channel();

        let start = timer.now();
        let _handle = timer.schedule(
            Duration::from_millis(20),
            Box::new(move || {
                let _ = tx.send(Instant::now());
            }),
        );

        let fired_at = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(fired_at.duration_since(start) >= Duration::from_millis(20));
    }

    #[test]
    fn cancelled_tokio_timer_never_fires() {
        let rt = runtime();
        let timer = TokioTimer::new(rt.handle().clone());
        let (tx, rx) = mpsc::channel::<()>();

        let handle = timer.schedule(
            Duration::from_millis(30),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        handle.cancel();

        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
    }

    #[test]
    fn current_requires_runtime() {
        assert!(TokioTimer::current().is_none());

        let rt = runtime();
        let _guard = rt.enter();
        assert!(TokioTimer::current().is_some());
    }

    #[test]
    fn detached_handle_cancel_is_noop() {
        TimerHandle::detached().cancel();
    }
}
