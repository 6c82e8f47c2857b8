//! Action and MissionRaw plugins driven end to end.

use missionlink_engine::plugins::{Action, ActionResult, MissionRaw, MissionRawResult};
use missionlink_engine::{EngineConfig, EngineError, RetryPolicy};
use missionlink_protocol::{CommandCode, CommandResultCode, MissionResultCode, MissionType};
use missionlink_testkit::prelude::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn capture<T: Send + 'static>() -> (Arc<Mutex<Option<T>>>, impl FnOnce(T) + Send + 'static) {
    let slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    (slot, move |value| *sink.lock() = Some(value))
}

fn settle<T>(sim: &Simulation, slot: &Arc<Mutex<Option<T>>>) {
    assert!(sim.run_until(|| slot.lock().is_some(), Duration::from_secs(60)));
}

#[test]
fn action_callbacks_report_results() {
    let sim = Simulation::new(SimConfig::default());
    let action = Action::new(sim.engine().clone(), sim.target());

    let (armed, done) = capture::<ActionResult>();
    action.arm_async(done);
    settle(&sim, &armed);
    assert_eq!(*armed.lock(), Some(ActionResult::Success));
    assert!(sim.vehicle().is_armed());

    let (killed, done) = capture::<ActionResult>();
    action.kill_async(done);
    settle(&sim, &killed);
    assert_eq!(*killed.lock(), Some(ActionResult::Success));
    assert!(!sim.vehicle().is_armed());

    let kill = sim.vehicle().received_commands()[1];
    assert_eq!(kill.command, CommandCode::ARM_DISARM);
    assert_eq!(kill.params.get(2), Some(21196.0));
}

#[test]
fn goto_location_sends_a_reposition() {
    let sim = Simulation::new(SimConfig::default());
    let action = Action::new(sim.engine().clone(), sim.target());

    let (moved, done) = capture::<ActionResult>();
    action.goto_location_async(47.397_742, 8.545_594, 520.0, 90.0, done);
    settle(&sim, &moved);
    assert_eq!(*moved.lock(), Some(ActionResult::Success));

    let goto = sim.vehicle().received_commands()[0];
    assert_eq!(goto.command, CommandCode::DO_REPOSITION);
    assert_eq!(goto.params.get(4), Some(90.0));
    assert_eq!(goto.params.get(7), Some(520.0));

    sim.vehicle().set_command_behavior(
        CommandCode::DO_REPOSITION,
        CommandBehavior::result(CommandResultCode::Denied),
    );
    let (refused, done) = capture::<ActionResult>();
    action.goto_location_async(47.4, 8.5, 520.0, f32::NAN, done);
    settle(&sim, &refused);
    assert_eq!(*refused.lock(), Some(ActionResult::CommandDenied));
}

#[test]
fn action_maps_denials() {
    let sim = Simulation::new(SimConfig::default());
    let action = Action::new(sim.engine().clone(), sim.target());
    sim.vehicle().set_command_behavior(
        CommandCode::NAV_TAKEOFF,
        CommandBehavior::result(CommandResultCode::Failed),
    );
    sim.vehicle().set_command_behavior(
        CommandCode::NAV_LAND,
        CommandBehavior::result(CommandResultCode::TemporarilyRejected),
    );
    sim.vehicle()
        .set_command_behavior(CommandCode::DO_VTOL_TRANSITION, CommandBehavior::Silent);

    let (takeoff, done) = capture::<ActionResult>();
    action.takeoff_async(done);
    settle(&sim, &takeoff);
    assert_eq!(
        *takeoff.lock(),
        Some(ActionResult::CommandDeniedPreconditionUnmet)
    );

    let (land, done) = capture::<ActionResult>();
    action.land_async(done);
    settle(&sim, &land);
    assert_eq!(*land.lock(), Some(ActionResult::Busy));

    let (transition, done) = capture::<ActionResult>();
    action.transition_to_fixedwing_async(done);
    settle(&sim, &transition);
    assert_eq!(*transition.lock(), Some(ActionResult::Timeout));
}

#[test]
fn mission_raw_round_trip_with_callbacks() {
    let sim = Simulation::new(SimConfig::default());
    let mission = MissionRaw::new(sim.engine().clone(), sim.target());
    let items = interleaved_mission();

    let (uploaded, done) = capture::<MissionRawResult>();
    mission.upload_mission_async(items.clone(), done);
    settle(&sim, &uploaded);
    assert_eq!(*uploaded.lock(), Some(MissionRawResult::Success));

    let (downloaded, done) = capture::<Result<Vec<MissionItem>, MissionRawResult>>();
    mission.download_mission_async(done);
    settle(&sim, &downloaded);
    assert_eq!(downloaded.lock().clone(), Some(Ok(items)));

    let (cleared, done) = capture::<MissionRawResult>();
    mission.clear_mission_async(done);
    settle(&sim, &cleared);
    assert_eq!(*cleared.lock(), Some(MissionRawResult::Success));
    assert!(sim.vehicle().mission(MissionType::Mission).is_empty());
}

#[test]
fn mission_raw_reports_vehicle_rejection() {
    let sim = Simulation::new(SimConfig::default());
    let mission = MissionRaw::new(sim.engine().clone(), sim.target());
    sim.vehicle().reject_next_upload(MissionResultCode::NoSpace);

    let (uploaded, done) = capture::<MissionRawResult>();
    mission.upload_mission_async(waypoints(20), done);
    settle(&sim, &uploaded);
    assert_eq!(*uploaded.lock(), Some(MissionRawResult::TooManyMissionItems));
}

#[test]
fn mission_raw_rejects_malformed_lists() {
    let sim = Simulation::new(SimConfig::default());
    let mission = MissionRaw::new(sim.engine().clone(), sim.target());
    let mut items = waypoints(3);
    items[2].seq = 5;

    let (uploaded, done) = capture::<MissionRawResult>();
    mission.upload_mission_async(items, done);
    assert_eq!(*uploaded.lock(), Some(MissionRawResult::InvalidArgument));
    assert_eq!(sim.link().stats().uplink_sent, 0);
}

#[test]
fn mission_raw_cancel_and_change_notifications() {
    let sim = Simulation::new(SimConfig::default());
    let mission =
        MissionRaw::new(sim.engine().clone(), sim.target()).with_mission_type(MissionType::Rally);
    let changes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&changes);
    let subscription = mission.subscribe_mission_changed(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let (downloaded, done) = capture::<Result<Vec<MissionItem>, MissionRawResult>>();
    mission.download_mission_async(done);
    assert!(mission.cancel_mission_transfer());
    assert_eq!(
        downloaded.lock().clone(),
        Some(Err(MissionRawResult::TransferCancelled))
    );
    assert!(!mission.cancel_mission_transfer());

    sim.broadcast_status(MissionType::Rally);
    let mut rally = waypoints(2);
    for item in &mut rally {
        item.mission_type = MissionType::Rally;
    }
    sim.vehicle().replace_mission(MissionType::Rally, rally);
    sim.broadcast_status(MissionType::Rally);
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert!(mission.unsubscribe_mission_changed(subscription));
}

#[test]
fn blocking_plugins_over_realtime_link() {
    let sim = RealtimeSim::new(SimConfig::default()).unwrap();
    let action = Action::new(sim.engine().clone(), sim.target());
    let mission = MissionRaw::new(sim.engine().clone(), sim.target());

    assert_eq!(action.arm(), ActionResult::Success);
    assert_eq!(action.return_to_launch(), ActionResult::Success);
    assert_eq!(
        action.goto_location(47.397_742, 8.545_594, 520.0, 0.0),
        ActionResult::Success
    );
    assert_eq!(action.disarm(), ActionResult::Success);
    assert!(!sim.vehicle().is_armed());

    let items = interleaved_mission();
    assert_eq!(mission.upload_mission(items.clone()), MissionRawResult::Success);
    assert_eq!(mission.download_mission(), Ok(items));
    assert_eq!(mission.clear_mission(), MissionRawResult::Success);
}

#[test]
fn async_engine_api_over_realtime_link() {
    let sim = RealtimeSim::new(SimConfig::default()).unwrap();
    let engine = sim.engine().clone();
    let target = sim.target();
    let items = waypoints(5);

    let downloaded = sim.block_on(async {
        engine
            .upload(target, MissionType::Mission, items.clone())
            .await?;
        engine
            .command(target, CommandCode::ARM_DISARM, &[1.0], RetryPolicy::default())
            .await?;
        engine.download(target, MissionType::Mission).await
    });
    assert_eq!(downloaded, Ok(items));
    assert!(sim.vehicle().is_armed());
}

#[test]
fn blocking_transfer_waits_for_the_session_to_time_out() {
    let policy = RetryPolicy::new(Duration::from_millis(100), 2);
    let config = SimConfig::default().with_engine(
        EngineConfig::new()
            .with_mission_policy(policy)
            .with_blocking_timeout(Duration::from_millis(10)),
    );
    let sim = RealtimeSim::new(config).unwrap();
    sim.link().set_loss(1.0);

    let start = Instant::now();
    let result = sim
        .engine()
        .download_blocking(sim.target(), MissionType::Mission);
    assert_eq!(result, Err(EngineError::TimedOut));
    assert!(start.elapsed() >= policy.worst_case());

    // The timed-out session already released the target.
    sim.link().set_loss(0.0);
    let retry = sim
        .engine()
        .download_blocking(sim.target(), MissionType::Mission);
    assert_eq!(retry, Ok(Vec::new()));
}
