//! Virtual clock.
//!
//! [`ManualClock`] implements the engine's timer seam on simulated time.
//! Nothing fires until the test advances the clock, so timeout and retry
//! behavior can be checked to the millisecond without sleeping.

use missionlink_engine::{Timer, TimerCallback, TimerHandle};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct ClockState {
    elapsed: Duration,
    next_seq: u64,
    pending: BTreeMap<(Duration, u64), TimerCallback>,
}

/// Timer service driven by the test.
#[derive(Clone)]
pub struct ManualClock {
    origin: Instant,
    state: Arc<Mutex<ClockState>>,
}

impl ManualClock {
    /// Creates a clock at virtual time zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(ClockState {
                elapsed: Duration::ZERO,
                next_seq: 0,
                pending: BTreeMap::new(),
            })),
        }
    }

    /// Virtual time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Number of timers waiting to fire.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Virtual time at which the next timer fires.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.state.lock().pending.keys().next().map(|(due, _)| *due)
    }

    /// Jumps to the earliest deadline and fires every timer due then.
    ///
    /// Returns false if no timer was pending.
    pub fn advance_to_next(&self) -> bool {
        match self.next_deadline() {
            Some(due) => {
                let now = self.elapsed();
                self.advance(due.saturating_sub(now));
                true
            }
            None => false,
        }
    }

    /// Moves time forward by `by`, firing due timers in deadline order.
    ///
    /// Timers scheduled by a callback fire in the same call if they fall
    /// inside the window. Returns the number of timers fired.
    pub fn advance(&self, by: Duration) -> usize {
        let until = self.elapsed() + by;
        let mut fired = 0;
        loop {
            let callback = {
                let mut state = self.state.lock();
                let key = match state.pending.keys().next() {
                    Some(key) if key.0 <= until => *key,
                    _ => break,
                };
                state.elapsed = key.0;
                state.pending.remove(&key)
            };
            if let Some(callback) = callback {
                callback();
                fired += 1;
            }
        }
        self.state.lock().elapsed = until;
        fired
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualClock")
            .field("elapsed", &state.elapsed)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl Timer for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn schedule(&self, after: Duration, callback: TimerCallback) -> TimerHandle {
        let key = {
            let mut state = self.state.lock();
            let key = (state.elapsed + after, state.next_seq);
            state.next_seq += 1;
            state.pending.insert(key, callback);
            key
        };
        let state = Arc::downgrade(&self.state);
        TimerHandle::new(move || {
            if let Some(state) = state.upgrade() {
                state.lock().pending.remove(&key);
            }
        })
    }
}
