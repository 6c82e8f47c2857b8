//! End-to-end harnesses.
//!
//! [`Simulation`] wires an [`Engine`] to a [`SimVehicle`] over a
//! [`SimLink`] on a [`ManualClock`]. Everything runs on the test thread:
//! traffic moves only when the harness pumps it and time moves only when
//! the harness advances it, so runs are reproducible for a given seed.
//!
//! [`RealtimeSim`] runs the same pieces on wall-clock time with a
//! background pump thread, for exercising the blocking and async APIs.

use crate::clock::ManualClock;
use crate::link::SimLink;
use crate::vehicle::SimVehicle;
use missionlink_engine::{
    Engine, EngineConfig, EngineError, EngineResult, LocalBus, RetryPolicy, TokioTimer,
};
use missionlink_protocol::{CommandCode, MissionItem, MissionType, Target};
use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Identity the engine uses on the simulated link.
pub const GROUND_STATION: Target = Target::component(255, 190);

/// Component id of the simulated autopilot.
pub const AUTOPILOT_COMPONENT: u8 = 1;

/// Upper bound on pump rounds before a run is considered livelocked.
const MAX_PUMP_ROUNDS: usize = 100_000;

/// Virtual time a helper waits for an operation before giving up.
const DRIVE_LIMIT: Duration = Duration::from_secs(600);

type Sink<T> = Box<dyn FnOnce(EngineResult<T>) + Send>;

/// Harness configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Engine configuration.
    pub engine: EngineConfig,
    /// System id of the simulated vehicle.
    pub system_id: u8,
    /// Probability of losing any one frame.
    pub loss: f64,
    /// Seed for the loss model.
    pub seed: u64,
    /// Whether the vehicle reports list identities.
    pub opaque_ids: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            system_id: 1,
            loss: 0.0,
            seed: 0,
            opaque_ids: true,
        }
    }
}

impl SimConfig {
    /// Sets the engine configuration.
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Sets the vehicle's system id.
    pub fn with_system_id(mut self, system_id: u8) -> Self {
        self.system_id = system_id;
        self
    }

    /// Sets the frame loss probability.
    pub fn with_loss(mut self, loss: f64) -> Self {
        self.loss = loss;
        self
    }

    /// Sets the loss model seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Controls whether the vehicle reports list identities.
    pub fn with_opaque_ids(mut self, enabled: bool) -> Self {
        self.opaque_ids = enabled;
        self
    }

    fn vehicle(&self) -> SimVehicle {
        let vehicle = SimVehicle::new(Target::component(self.system_id, AUTOPILOT_COMPONENT));
        if self.opaque_ids {
            vehicle
        } else {
            vehicle.without_opaque_ids()
        }
    }

    fn link(&self) -> SimLink {
        let link = SimLink::new(
            GROUND_STATION,
            Target::component(self.system_id, AUTOPILOT_COMPONENT),
            self.seed,
        );
        link.set_loss(self.loss);
        link
    }
}

/// Deterministic single-threaded harness.
pub struct Simulation {
    engine: Engine,
    bus: Arc<LocalBus>,
    link: Arc<SimLink>,
    vehicle: Arc<SimVehicle>,
    clock: ManualClock,
    target: Target,
}

impl Simulation {
    /// Creates a harness.
    pub fn new(config: SimConfig) -> Self {
        let link = Arc::new(config.link());
        let vehicle = Arc::new(config.vehicle());
        let bus = Arc::new(LocalBus::new(link.clone()));
        let clock = ManualClock::new();
        let engine = Engine::new(config.engine, bus.clone(), Arc::new(clock.clone()));
        let target = Target::system(config.system_id);
        engine.target_connected(target);

        Self {
            engine,
            bus,
            link,
            vehicle,
            clock,
            target,
        }
    }

    /// The engine under test.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The simulated link.
    pub fn link(&self) -> &SimLink {
        &self.link
    }

    /// The simulated vehicle.
    pub fn vehicle(&self) -> &SimVehicle {
        &self.vehicle
    }

    /// The virtual clock.
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Target the engine uses to address the vehicle.
    pub fn target(&self) -> Target {
        self.target
    }

    /// Virtual time since the harness was created.
    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    /// Moves traffic until the link is quiet. Returns frames moved.
    pub fn pump(&self) -> usize {
        let mut moved = 0;
        for _ in 0..MAX_PUMP_ROUNDS {
            let round = self.link.pump_once(&self.vehicle, &self.bus);
            if round == 0 {
                return moved;
            }
            moved += round;
        }
        warn!(moved, "link never went quiet");
        moved
    }

    /// Alternates pumping and advancing the clock until `done` holds.
    ///
    /// Queued traffic is always delivered before the clock moves, so a
    /// reply is never beaten by the timer of the request it answers.
    /// Returns false if `limit` of virtual time passed or nothing was
    /// left to wait for.
    pub fn run_until(&self, done: impl Fn() -> bool, limit: Duration) -> bool {
        let deadline = self.clock.elapsed() + limit;
        loop {
            self.pump();
            if done() {
                return true;
            }
            match self.clock.next_deadline() {
                Some(due) if due <= deadline => {
                    self.clock.advance_to_next();
                }
                _ => return false,
            }
        }
    }

    fn drive<T: Send + 'static>(&self, start: impl FnOnce(Sink<T>)) -> EngineResult<T> {
        let slot: Arc<Mutex<Option<EngineResult<T>>>> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);
        start(Box::new(move |result| *sink.lock() = Some(result)));

        if !self.run_until(|| slot.lock().is_some(), DRIVE_LIMIT) {
            debug!(elapsed = ?self.elapsed(), "operation did not complete");
        }
        let result = slot.lock().take();
        result.unwrap_or(Err(EngineError::TimedOut))
    }

    /// Uploads a list and runs the link until the upload completes.
    pub fn upload(&self, mission_type: MissionType, items: Vec<MissionItem>) -> EngineResult<()> {
        self.drive(|done| {
            self.engine
                .start_upload(self.target, mission_type, items, done)
        })
    }

    /// Downloads a list and runs the link until the download completes.
    pub fn download(&self, mission_type: MissionType) -> EngineResult<Vec<MissionItem>> {
        self.drive(|done| self.engine.start_download(self.target, mission_type, done))
    }

    /// Clears a list and runs the link until the vehicle answers.
    pub fn clear(&self, mission_type: MissionType) -> EngineResult<()> {
        self.drive(|done| self.engine.clear_mission(self.target, mission_type, done))
    }

    /// Sends a command and runs the link until it resolves.
    pub fn command(
        &self,
        code: CommandCode,
        params: &[f32],
        policy: RetryPolicy,
    ) -> EngineResult<()> {
        self.drive(|done| {
            self.engine
                .invoke_command(self.target, code, params, policy, done)
        })
    }

    /// Has the vehicle broadcast the status of one list and delivers it.
    pub fn broadcast_status(&self, mission_type: MissionType) {
        self.link.inject(self.vehicle.status(mission_type));
        self.pump();
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("target", &self.target)
            .field("clock", &self.clock)
            .field("link", &self.link)
            .finish()
    }
}

/// Wall-clock harness with a background pump thread.
pub struct RealtimeSim {
    engine: Engine,
    link: Arc<SimLink>,
    vehicle: Arc<SimVehicle>,
    target: Target,
    stop: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
    runtime: tokio::runtime::Runtime,
}

impl RealtimeSim {
    /// Starts the harness.
    pub fn new(config: SimConfig) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("missionlink-sim")
            .enable_time()
            .build()?;

        let link = Arc::new(config.link());
        let vehicle = Arc::new(config.vehicle());
        let bus = Arc::new(LocalBus::new(link.clone()));
        let timer = Arc::new(TokioTimer::new(runtime.handle().clone()));
        let engine = Engine::new(config.engine, bus.clone(), timer);
        let target = Target::system(config.system_id);
        engine.target_connected(target);

        let stop = Arc::new(AtomicBool::new(false));
        let pump = {
            let stop = Arc::clone(&stop);
            let link = Arc::clone(&link);
            let vehicle = Arc::clone(&vehicle);
            thread::Builder::new()
                .name("missionlink-sim-link".into())
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        if link.pump_once(&vehicle, &bus) == 0 {
                            thread::sleep(Duration::from_millis(1));
                        }
                    }
                })?
        };

        Ok(Self {
            engine,
            link,
            vehicle,
            target,
            stop,
            pump: Some(pump),
            runtime,
        })
    }

    /// The engine under test.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The simulated link.
    pub fn link(&self) -> &SimLink {
        &self.link
    }

    /// The simulated vehicle.
    pub fn vehicle(&self) -> &SimVehicle {
        &self.vehicle
    }

    /// Target the engine uses to address the vehicle.
    pub fn target(&self) -> Target {
        self.target
    }

    /// Runs a future to completion on the harness runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Has the vehicle broadcast the status of one list.
    pub fn broadcast_status(&self, mission_type: MissionType) {
        self.link.inject(self.vehicle.status(mission_type));
    }
}

impl Drop for RealtimeSim {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                warn!("link pump thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for RealtimeSim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSim")
            .field("target", &self.target)
            .field("link", &self.link)
            .finish()
    }
}
