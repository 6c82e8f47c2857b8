//! Simulate command implementation.

use missionlink_engine::plugins::{Action, ActionResult, MissionRaw, MissionRawResult};
use missionlink_engine::EngineConfig;
use missionlink_testkit::fixtures::waypoints;
use missionlink_testkit::{LinkStats, RealtimeSim, SimConfig};
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

/// Errors that stop a simulation run.
#[derive(Debug, Error)]
pub enum SimulateError {
    /// Loss probability outside `[0, 1]`.
    #[error("loss probability must be between 0 and 1, got {0}")]
    InvalidLoss(f64),

    /// Unsupported `--format` value.
    #[error("unknown output format '{0}' (expected text or json)")]
    UnknownFormat(String),

    /// At least one step did not succeed.
    #[error("{0} of 3 steps failed")]
    StepsFailed(usize),
}

/// Outcome of one step.
#[derive(Debug, Serialize)]
pub struct StepReport {
    /// Step name.
    pub step: &'static str,
    /// Result as reported by the plugin.
    pub result: String,
    /// Whether the step succeeded.
    pub ok: bool,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u128,
}

/// Link counters at the end of the run.
#[derive(Debug, Serialize)]
pub struct TrafficReport {
    /// Frames sent towards the vehicle.
    pub uplink_sent: u64,
    /// Frames lost towards the vehicle.
    pub uplink_dropped: u64,
    /// Frames sent towards the ground.
    pub downlink_sent: u64,
    /// Frames lost towards the ground.
    pub downlink_dropped: u64,
}

impl From<LinkStats> for TrafficReport {
    fn from(stats: LinkStats) -> Self {
        Self {
            uplink_sent: stats.uplink_sent,
            uplink_dropped: stats.uplink_dropped,
            downlink_sent: stats.downlink_sent,
            downlink_dropped: stats.downlink_dropped,
        }
    }
}

/// Simulation run result.
#[derive(Debug, Serialize)]
pub struct SimulateResult {
    /// Vehicle system id.
    pub system_id: u8,
    /// Number of mission items.
    pub items: u16,
    /// Frame loss probability.
    pub loss: f64,
    /// Loss model seed.
    pub seed: u64,
    /// Per-step outcomes.
    pub steps: Vec<StepReport>,
    /// Whether the downloaded list matched the uploaded one.
    pub round_trip_identical: bool,
    /// Link counters.
    pub traffic: TrafficReport,
}

fn timed<T>(
    step: &'static str,
    f: impl FnOnce() -> T,
    summarize: impl FnOnce(&T) -> (String, bool),
) -> (T, StepReport) {
    let start = Instant::now();
    let value = f();
    let elapsed_ms = start.elapsed().as_millis();
    let (result, ok) = summarize(&value);
    info!(step, %result, elapsed_ms, "step finished");
    let report = StepReport {
        step,
        result,
        ok,
        elapsed_ms,
    };
    (value, report)
}

/// Runs the simulate command.
pub fn run(
    items: u16,
    loss: f64,
    seed: u64,
    system_id: u8,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&loss) {
        return Err(SimulateError::InvalidLoss(loss).into());
    }
    if format != "text" && format != "json" {
        return Err(SimulateError::UnknownFormat(format.to_string()).into());
    }

    let config = SimConfig::default()
        .with_engine(EngineConfig::new().with_blocking_timeout(Duration::from_secs(60)))
        .with_system_id(system_id)
        .with_loss(loss)
        .with_seed(seed);
    let sim = RealtimeSim::new(config)?;
    let mission = MissionRaw::new(sim.engine().clone(), sim.target());
    let action = Action::new(sim.engine().clone(), sim.target());
    let plan = waypoints(items);

    info!(target = %sim.target(), items, loss, seed, "simulation started");

    let (_, upload) = timed(
        "upload",
        || mission.upload_mission(plan.clone()),
        |r| (r.to_string(), *r == MissionRawResult::Success),
    );
    let (downloaded, download) = timed(
        "download",
        || mission.download_mission(),
        |r| match r {
            Ok(list) => (format!("{} items", list.len()), true),
            Err(err) => (err.to_string(), false),
        },
    );
    let round_trip_identical = downloaded.as_ref().is_ok_and(|list| *list == plan);
    let (_, arm) = timed(
        "arm",
        || action.arm(),
        |r| (r.to_string(), *r == ActionResult::Success),
    );

    let result = SimulateResult {
        system_id,
        items,
        loss,
        seed,
        steps: vec![upload, download, arm],
        round_trip_identical,
        traffic: sim.link().stats().into(),
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_text(&result);
    }

    let failed = result.steps.iter().filter(|step| !step.ok).count();
    if failed > 0 {
        return Err(SimulateError::StepsFailed(failed).into());
    }
    Ok(())
}

fn print_text(result: &SimulateResult) {
    println!("MissionLink Simulation");
    println!("======================");
    println!("System ID:   {}", result.system_id);
    println!("Items:       {}", result.items);
    println!("Loss:        {:.1}%", result.loss * 100.0);
    println!("Seed:        {}", result.seed);
    println!();
    for step in &result.steps {
        let mark = if step.ok { "ok" } else { "FAILED" };
        println!(
            "{:<10} {:<6} {} ({} ms)",
            step.step, mark, step.result, step.elapsed_ms
        );
    }
    println!();
    println!("Round trip identical: {}", result.round_trip_identical);
    println!(
        "Uplink:   {} sent, {} dropped",
        result.traffic.uplink_sent, result.traffic.uplink_dropped
    );
    println!(
        "Downlink: {} sent, {} dropped",
        result.traffic.downlink_sent, result.traffic.downlink_dropped
    );
}
