//! Generic driver for request/response exchanges.
//!
//! Commands and mission transfers are written as sans-IO state machines
//! implementing [`Exchange`]. Each event (start, inbound message, timer
//! expiry, cancel) returns a list of [`Step`]s; the [`Driver`] computes
//! them under its lock and performs sends, timer re-arms and the final
//! completion after the lock is released.
//!
//! Timer expirations carry the epoch they were armed in. A re-arm bumps
//! the epoch, so an expiry racing with a response is discarded.

use crate::bridge::Completion;
use crate::bus::{Filter, SubscriptionId};
use crate::engine::Shared;
use crate::error::{EngineError, EngineResult};
use crate::notifier::Baseline;
use crate::registry::{ActiveOperation, OperationId, SlotState};
use crate::timer::TimerHandle;
use missionlink_protocol::{Envelope, Message, MessageKind, Target};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Action requested by an exchange.
#[derive(Debug)]
pub(crate) enum Step<T> {
    /// Send a message; failure terminates the exchange with `Transport`.
    Send(Message),
    /// Send a message on a best-effort basis.
    Notify(Message),
    /// Restart the response deadline.
    Rearm,
    /// Terminate with a result.
    Finish(EngineResult<T>),
}

pub(crate) type Steps<T> = Vec<Step<T>>;

/// A sans-IO request/response state machine.
pub(crate) trait Exchange: Send + 'static {
    /// Result delivered on success.
    type Output: Send + 'static;

    /// Name used in logs.
    const NAME: &'static str;

    /// Inbound message kinds and filters the exchange listens to.
    ///
    /// The driver additionally restricts every filter to the target.
    fn interests(&self) -> Vec<(MessageKind, Filter)>;

    fn start(&mut self) -> Steps<Self::Output>;

    fn on_message(&mut self, envelope: &Envelope) -> Steps<Self::Output>;

    fn on_timeout(&mut self) -> Steps<Self::Output>;

    fn on_cancel(&mut self) -> Steps<Self::Output>;

    /// Fingerprints to record after success.
    fn baselines(&self) -> Vec<Baseline> {
        Vec::new()
    }
}

/// Retry budget for one exchange.
///
/// Refilled on every sign of progress, so the budget bounds consecutive
/// silent periods rather than the whole exchange.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryBudget {
    retries: u32,
    left: u32,
    sends: u32,
}

impl RetryBudget {
    pub(crate) fn new(retries: u32) -> Self {
        Self {
            retries,
            left: retries,
            sends: 0,
        }
    }

    /// Records a send of a new artifact.
    pub(crate) fn progress(&mut self) {
        self.left = self.retries;
        self.sends = self.sends.saturating_add(1);
    }

    /// Consumes one retry. Returns false when the budget is exhausted.
    pub(crate) fn consume(&mut self) -> bool {
        if self.left == 0 {
            return false;
        }
        self.left -= 1;
        self.sends = self.sends.saturating_add(1);
        true
    }

    /// Number of messages sent so far.
    pub(crate) fn sends(&self) -> u32 {
        self.sends
    }
}

struct DriverState<E: Exchange> {
    exchange: E,
    epoch: u64,
    timer: Option<TimerHandle>,
    subscriptions: Vec<SubscriptionId>,
    completion: Option<Completion<EngineResult<E::Output>>>,
    finished: bool,
}

/// Runs one exchange against the bus and timer of an engine.
pub(crate) struct Driver<E: Exchange> {
    id: OperationId,
    target: Target,
    timeout: Duration,
    shared: Arc<Shared>,
    state: Mutex<DriverState<E>>,
}

impl<E: Exchange> Driver<E> {
    /// Claims the target's slot and starts the exchange.
    ///
    /// A busy slot completes immediately with `Busy`, without any traffic.
    pub(crate) fn launch(
        shared: Arc<Shared>,
        target: Target,
        slot: SlotState,
        timeout: Duration,
        exchange: E,
        completion: Completion<EngineResult<E::Output>>,
    ) {
        let driver = Arc::new(Self {
            id: OperationId::next(),
            target,
            timeout,
            shared,
            state: Mutex::new(DriverState {
                exchange,
                epoch: 0,
                timer: None,
                subscriptions: Vec::new(),
                completion: Some(completion),
                finished: false,
            }),
        });

        let operation: Arc<dyn ActiveOperation> = driver.clone();
        if let Err(err) = driver.shared.registry.claim(target, slot, operation) {
            debug!(target = %target, exchange = E::NAME, "slot busy");
            let completion = {
                let mut state = driver.state.lock();
                state.finished = true;
                state.completion.take()
            };
            if let Some(completion) = completion {
                completion.complete(Err(err));
            }
            return;
        }

        debug!(target = %target, exchange = E::NAME, "starting");
        driver.subscribe();
        let steps = driver.state.lock().exchange.start();
        driver.run(steps);
    }

    fn subscribe(self: &Arc<Self>) {
        let interests = self.state.lock().exchange.interests();
        let target = self.target;

        let ids: Vec<SubscriptionId> = interests
            .into_iter()
            .map(|(kind, filter)| {
                let weak = Arc::downgrade(self);
                self.shared.bus.subscribe(
                    kind,
                    Box::new(move |env: &Envelope| target.matches(&env.source) && filter(env)),
                    Arc::new(move |env: &Envelope| {
                        if let Some(driver) = weak.upgrade() {
                            driver.on_message(env);
                        }
                    }),
                )
            })
            .collect();

        let mut state = self.state.lock();
        if state.finished {
            drop(state);
            for id in ids {
                self.shared.bus.unsubscribe(id);
            }
        } else {
            state.subscriptions = ids;
        }
    }

    fn on_message(self: &Arc<Self>, envelope: &Envelope) {
        let steps = {
            let mut state = self.state.lock();
            if state.finished {
                return;
            }
            state.exchange.on_message(envelope)
        };
        self.run(steps);
    }

    fn on_timer(self: &Arc<Self>, epoch: u64) {
        let steps = {
            let mut state = self.state.lock();
            if state.finished || state.epoch != epoch {
                return;
            }
            state.timer = None;
            state.exchange.on_timeout()
        };
        self.run(steps);
    }

    fn run(self: &Arc<Self>, steps: Steps<E::Output>) {
        for step in steps {
            match step {
                Step::Send(message) => {
                    if self.is_finished() {
                        return;
                    }
                    if let Err(err) = self.shared.bus.send(self.target, message) {
                        self.finish(Err(err.into()));
                        return;
                    }
                }
                Step::Notify(message) => {
                    if self.is_finished() {
                        return;
                    }
                    if let Err(err) = self.shared.bus.send(self.target, message) {
                        debug!(target = %self.target, error = %err, "best-effort send failed");
                    }
                }
                Step::Rearm => self.rearm(),
                Step::Finish(result) => {
                    self.finish(result);
                    return;
                }
            }
        }
    }

    fn rearm(self: &Arc<Self>) {
        let previous = {
            let mut state = self.state.lock();
            if state.finished {
                return;
            }
            state.epoch += 1;
            let epoch = state.epoch;
            let weak = Arc::downgrade(self);
            let handle = self.shared.timer.schedule(
                self.timeout,
                Box::new(move || {
                    if let Some(driver) = weak.upgrade() {
                        driver.on_timer(epoch);
                    }
                }),
            );
            state.timer.replace(handle)
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    fn finish(self: &Arc<Self>, result: EngineResult<E::Output>) {
        let (timer, subscriptions, completion, baselines) = {
            let mut state = self.state.lock();
            if state.finished {
                return;
            }
            state.finished = true;
            let baselines = if result.is_ok() {
                state.exchange.baselines()
            } else {
                Vec::new()
            };
            (
                state.timer.take(),
                std::mem::take(&mut state.subscriptions),
                state.completion.take(),
                baselines,
            )
        };

        if let Some(timer) = timer {
            timer.cancel();
        }
        for id in subscriptions {
            self.shared.bus.unsubscribe(id);
        }
        self.shared.registry.release(self.target, self.id, &baselines);

        match &result {
            Ok(_) => info!(target = %self.target, exchange = E::NAME, "completed"),
            Err(err) => warn!(target = %self.target, exchange = E::NAME, error = %err, "failed"),
        }

        if let Some(completion) = completion {
            completion.complete(result);
        }
    }

    fn is_finished(&self) -> bool {
        self.state.lock().finished
    }
}

impl<E: Exchange> ActiveOperation for Driver<E> {
    fn id(&self) -> OperationId {
        self.id
    }

    fn cancel(self: Arc<Self>) {
        let steps = {
            let mut state = self.state.lock();
            if state.finished {
                return;
            }
            state.exchange.on_cancel()
        };
        self.run(steps);
    }

    fn abort(self: Arc<Self>, error: EngineError) {
        self.finish(Err(error));
    }
}
