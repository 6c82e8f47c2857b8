//! The engine facade.
//!
//! [`Engine`] is a cloneable handle. All clones share one registry,
//! one notifier and one bus subscription for status broadcasts. Dropping
//! the last clone aborts whatever is still in flight with `Cancelled`.

use crate::bridge::{self, Completion, CompletionFuture};
use crate::bus::{MessageBus, SubscriptionId};
use crate::config::{EngineConfig, RetryPolicy};
use crate::driver::Driver;
use crate::error::{EngineError, EngineResult};
use crate::invoker::{CommandExchange, CommandRequest};
use crate::notifier::{ChangeSubscription, MissionChangeNotifier};
use crate::registry::{Registry, SlotState};
use crate::timer::Timer;
use crate::transfer::{ClearExchange, DownloadExchange, UploadExchange};
use missionlink_protocol::{
    CommandCode, CommandParams, Envelope, MessageKind, MissionItem, MissionType, Target,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// State shared by the engine handle and its in-flight operations.
pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) bus: Arc<dyn MessageBus>,
    pub(crate) timer: Arc<dyn Timer>,
    pub(crate) registry: Registry,
    pub(crate) notifier: MissionChangeNotifier,
    transactions: AtomicU32,
}

impl Shared {
    fn on_status(&self, envelope: &Envelope) {
        self.notifier.on_status(&self.registry, envelope);
    }
}

struct Inner {
    shared: Arc<Shared>,
    status_subscription: SubscriptionId,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shared.bus.unsubscribe(self.status_subscription);
        let pending = self.shared.registry.drain();
        if !pending.is_empty() {
            debug!(count = pending.len(), "engine dropped, cancelling in-flight operations");
        }
        for operation in pending {
            operation.abort(EngineError::Cancelled);
        }
    }
}

/// Reliable command and mission transfer engine.
///
/// Every operation is asynchronous and delivers exactly one result through
/// its completion callback. The `_blocking` variants park the caller until
/// that result arrives; the async variants return a future.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Creates an engine on top of a message bus and a timer service.
    pub fn new(config: EngineConfig, bus: Arc<dyn MessageBus>, timer: Arc<dyn Timer>) -> Self {
        let shared = Arc::new(Shared {
            config,
            bus,
            timer,
            registry: Registry::new(),
            notifier: MissionChangeNotifier::new(),
            transactions: AtomicU32::new(1),
        });

        let weak = Arc::downgrade(&shared);
        let status_subscription = shared.bus.subscribe(
            MessageKind::MissionStatus,
            Box::new(|_| true),
            Arc::new(move |env: &Envelope| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_status(env);
                }
            }),
        );

        debug!(
            command_timeout = ?shared.config.command.timeout,
            mission_timeout = ?shared.config.mission.timeout,
            "engine created"
        );
        Self {
            inner: Arc::new(Inner {
                shared,
                status_subscription,
            }),
        }
    }

    fn shared(&self) -> &Arc<Shared> {
        &self.inner.shared
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.shared().config
    }

    /// Returns what the slot of `target` is doing.
    pub fn slot_state(&self, target: Target) -> SlotState {
        self.shared().registry.slot_state(target)
    }

    // Commands

    /// Sends a command and reports the outcome through `completion`.
    ///
    /// `params` holds up to seven values; the rest are zero.
    pub fn invoke_command(
        &self,
        target: Target,
        code: CommandCode,
        params: &[f32],
        policy: RetryPolicy,
        completion: impl FnOnce(EngineResult<()>) + Send + 'static,
    ) {
        self.launch_command(target, code, params, policy, Completion::new(completion));
    }

    fn launch_command(
        &self,
        target: Target,
        code: CommandCode,
        params: &[f32],
        policy: RetryPolicy,
        completion: Completion<EngineResult<()>>,
    ) {
        let params = match CommandParams::from_slice(params) {
            Ok(params) => params,
            Err(err) => {
                completion.complete(Err(err.into()));
                return;
            }
        };
        let request = CommandRequest {
            target,
            code,
            params,
            transaction: self.shared().transactions.fetch_add(1, Ordering::Relaxed),
        };
        Driver::launch(
            Arc::clone(self.shared()),
            target,
            SlotState::Invoking,
            policy.timeout,
            CommandExchange::new(request, policy.retries),
            completion,
        );
    }

    /// Blocking form of [`Engine::invoke_command`].
    pub fn invoke_command_blocking(
        &self,
        target: Target,
        code: CommandCode,
        params: &[f32],
        policy: RetryPolicy,
    ) -> EngineResult<()> {
        self.block(self.blocking_wait(policy), |done| {
            self.launch_command(target, code, params, policy, done)
        })
    }

    /// Async form of [`Engine::invoke_command`].
    pub async fn command(
        &self,
        target: Target,
        code: CommandCode,
        params: &[f32],
        policy: RetryPolicy,
    ) -> EngineResult<()> {
        let fut = bridge::future(|done| self.launch_command(target, code, params, policy, done));
        resolve(fut).await
    }

    // Mission transfers

    /// Uploads `items` as the `mission_type` list of `target`.
    pub fn start_upload(
        &self,
        target: Target,
        mission_type: MissionType,
        items: Vec<MissionItem>,
        completion: impl FnOnce(EngineResult<()>) + Send + 'static,
    ) {
        self.launch_upload(target, mission_type, items, Completion::new(completion));
    }

    fn launch_upload(
        &self,
        target: Target,
        mission_type: MissionType,
        items: Vec<MissionItem>,
        completion: Completion<EngineResult<()>>,
    ) {
        let policy = self.config().mission;
        match UploadExchange::new(target, mission_type, items, policy.retries) {
            Ok(exchange) => Driver::launch(
                Arc::clone(self.shared()),
                target,
                SlotState::Transferring,
                policy.timeout,
                exchange,
                completion,
            ),
            Err(err) => {
                warn!(target = %target, error = %err, "upload rejected before sending");
                completion.complete(Err(err));
            }
        }
    }

    /// Blocking form of [`Engine::start_upload`].
    pub fn upload_blocking(
        &self,
        target: Target,
        mission_type: MissionType,
        items: Vec<MissionItem>,
    ) -> EngineResult<()> {
        self.block(self.blocking_wait(self.config().mission), |done| {
            self.launch_upload(target, mission_type, items, done)
        })
    }

    /// Async form of [`Engine::start_upload`].
    pub async fn upload(
        &self,
        target: Target,
        mission_type: MissionType,
        items: Vec<MissionItem>,
    ) -> EngineResult<()> {
        let fut = bridge::future(|done| self.launch_upload(target, mission_type, items, done));
        resolve(fut).await
    }

    /// Downloads the `mission_type` list of `target`.
    pub fn start_download(
        &self,
        target: Target,
        mission_type: MissionType,
        completion: impl FnOnce(EngineResult<Vec<MissionItem>>) + Send + 'static,
    ) {
        self.launch_download(target, mission_type, Completion::new(completion));
    }

    fn launch_download(
        &self,
        target: Target,
        mission_type: MissionType,
        completion: Completion<EngineResult<Vec<MissionItem>>>,
    ) {
        if !mission_type.is_transferable() {
            completion.complete(Err(EngineError::invalid(format!(
                "mission type {mission_type} cannot be transferred"
            ))));
            return;
        }
        let policy = self.config().mission;
        Driver::launch(
            Arc::clone(self.shared()),
            target,
            SlotState::Transferring,
            policy.timeout,
            DownloadExchange::new(target, mission_type, policy.retries),
            completion,
        );
    }

    /// Blocking form of [`Engine::start_download`].
    pub fn download_blocking(
        &self,
        target: Target,
        mission_type: MissionType,
    ) -> EngineResult<Vec<MissionItem>> {
        self.block(self.blocking_wait(self.config().mission), |done| {
            self.launch_download(target, mission_type, done)
        })
    }

    /// Async form of [`Engine::start_download`].
    pub async fn download(
        &self,
        target: Target,
        mission_type: MissionType,
    ) -> EngineResult<Vec<MissionItem>> {
        let fut = bridge::future(|done| self.launch_download(target, mission_type, done));
        resolve(fut).await
    }

    /// Deletes the `mission_type` list of `target`; `All` clears every list.
    pub fn clear_mission(
        &self,
        target: Target,
        mission_type: MissionType,
        completion: impl FnOnce(EngineResult<()>) + Send + 'static,
    ) {
        self.launch_clear(target, mission_type, Completion::new(completion));
    }

    fn launch_clear(
        &self,
        target: Target,
        mission_type: MissionType,
        completion: Completion<EngineResult<()>>,
    ) {
        let policy = self.config().mission;
        Driver::launch(
            Arc::clone(self.shared()),
            target,
            SlotState::Transferring,
            policy.timeout,
            ClearExchange::new(target, mission_type, policy.retries),
            completion,
        );
    }

    /// Blocking form of [`Engine::clear_mission`].
    pub fn clear_blocking(
        &self,
        target: Target,
        mission_type: MissionType,
    ) -> EngineResult<()> {
        self.block(self.blocking_wait(self.config().mission), |done| {
            self.launch_clear(target, mission_type, done)
        })
    }

    /// Cancels whatever is in flight for `target`.
    ///
    /// The operation completes with `Cancelled`. Returns false if the slot
    /// was idle.
    pub fn cancel(&self, target: Target) -> bool {
        match self.shared().registry.active(target) {
            Some(operation) => {
                info!(target = %target, "cancelling in-flight operation");
                operation.cancel();
                true
            }
            None => false,
        }
    }

    // Mission-change notifications

    /// Calls `handler` whenever the remote's stored lists change for reasons
    /// other than this engine's own transfers.
    pub fn on_mission_changed(
        &self,
        target: Target,
        handler: impl Fn() + Send + Sync + 'static,
    ) -> ChangeSubscription {
        self.shared().notifier.subscribe(target, Arc::new(handler))
    }

    /// Removes a mission-change handler. Returns false for unknown handles.
    pub fn unsubscribe_mission_changed(&self, subscription: ChangeSubscription) -> bool {
        self.shared().notifier.unsubscribe(subscription)
    }

    // Target lifecycle

    /// Registers a newly discovered target. Returns false if already known.
    pub fn target_connected(&self, target: Target) -> bool {
        let added = self.shared().registry.attach(target);
        if added {
            info!(target = %target, "target connected");
        }
        added
    }

    /// Forgets a target, failing its in-flight operation with `Disconnected`.
    ///
    /// Returns the number of operations aborted.
    pub fn target_disconnected(&self, target: Target) -> usize {
        let pending = self.shared().registry.detach(target);
        info!(target = %target, aborted = pending.len(), "target disconnected");
        let aborted = pending.len();
        for operation in pending {
            operation.abort(EngineError::Disconnected(target));
        }
        aborted
    }

    /// How long a blocking call waits for an operation run under `policy`.
    ///
    /// At least one period past the policy's worst case, so a silent remote
    /// surfaces as the operation's own `TimedOut` with the slot already free.
    fn blocking_wait(&self, policy: RetryPolicy) -> Duration {
        let settled = policy.worst_case().saturating_add(policy.timeout);
        self.config().blocking_timeout.max(settled)
    }

    fn block<T, F>(&self, timeout: Duration, start: F) -> EngineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Completion<EngineResult<T>>),
    {
        bridge::wait(timeout, start).unwrap_or_else(|err| {
            warn!(error = %err, "blocking call returned without a result");
            Err(err.into())
        })
    }
}

async fn resolve<T>(fut: CompletionFuture<EngineResult<T>>) -> EngineResult<T> {
    fut.await.unwrap_or_else(|err| Err(err.into()))
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", self.config())
            .field("targets", &self.shared().registry.len())
            .field("change_subscribers", &self.shared().notifier.subscriber_count())
            .finish()
    }
}
