//! End-to-end mission transfer tests against the simulated vehicle.

use missionlink_engine::{
    DenialReason, EngineConfig, EngineError, EngineResult, RetryPolicy, SlotState,
};
use missionlink_protocol::{CommandCode, MessageKind, MissionResultCode, MissionType};
use missionlink_testkit::prelude::*;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let hits = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&hits);
    (hits, move || {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

fn short_mission_policy(retries: u32) -> SimConfig {
    SimConfig::default().with_engine(
        EngineConfig::new()
            .with_mission_policy(RetryPolicy::new(Duration::from_millis(250), retries)),
    )
}

#[test]
fn upload_download_and_external_change() {
    let sim = Simulation::new(SimConfig::default());
    let (early_hits, early) = counter();
    sim.engine().on_mission_changed(sim.target(), early);

    let items = interleaved_mission();
    sim.upload(MissionType::Mission, items.clone()).unwrap();
    assert_eq!(sim.download(MissionType::Mission).unwrap(), items);

    // Our own upload is already the baseline.
    sim.broadcast_status(MissionType::Mission);
    assert_eq!(early_hits.load(Ordering::SeqCst), 0);

    sim.vehicle()
        .replace_mission(MissionType::Mission, waypoints(2));
    sim.broadcast_status(MissionType::Mission);
    assert_eq!(early_hits.load(Ordering::SeqCst), 1);

    let (late_hits, late) = counter();
    sim.engine().on_mission_changed(sim.target(), late);
    sim.broadcast_status(MissionType::Mission);
    assert_eq!(early_hits.load(Ordering::SeqCst), 1);
    assert_eq!(late_hits.load(Ordering::SeqCst), 0);
}

#[test]
fn first_status_only_records_a_baseline() {
    let sim = Simulation::new(SimConfig::default());
    let (hits, handler) = counter();
    sim.engine().on_mission_changed(sim.target(), handler);

    sim.vehicle()
        .replace_mission(MissionType::Mission, waypoints(3));
    sim.broadcast_status(MissionType::Mission);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    sim.vehicle()
        .replace_mission(MissionType::Mission, waypoints(3));
    sim.broadcast_status(MissionType::Mission);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn change_detection_falls_back_to_counts() {
    let sim = Simulation::new(SimConfig::default().with_opaque_ids(false));
    let (hits, handler) = counter();
    let subscription = sim.engine().on_mission_changed(sim.target(), handler);

    sim.upload(MissionType::Mission, waypoints(4)).unwrap();

    // Same length, no identity: indistinguishable.
    sim.vehicle()
        .replace_mission(MissionType::Mission, interleaved_mission());
    sim.broadcast_status(MissionType::Mission);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    sim.vehicle()
        .replace_mission(MissionType::Mission, waypoints(7));
    sim.broadcast_status(MissionType::Mission);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    assert!(sim.engine().unsubscribe_mission_changed(subscription));
    sim.vehicle()
        .replace_mission(MissionType::Mission, waypoints(1));
    sim.broadcast_status(MissionType::Mission);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn clear_resets_the_baseline() {
    let sim = Simulation::new(SimConfig::default());
    let (hits, handler) = counter();
    sim.engine().on_mission_changed(sim.target(), handler);

    sim.upload(MissionType::Mission, waypoints(5)).unwrap();
    sim.clear(MissionType::Mission).unwrap();
    assert!(sim.vehicle().mission(MissionType::Mission).is_empty());

    sim.broadcast_status(MissionType::Mission);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(sim.download(MissionType::Mission).unwrap().is_empty());
}

#[test]
fn empty_upload_is_accepted() {
    let sim = Simulation::new(SimConfig::default());
    sim.upload(MissionType::Mission, waypoints(3)).unwrap();
    sim.upload(MissionType::Mission, Vec::new()).unwrap();
    assert!(sim.vehicle().mission(MissionType::Mission).is_empty());
}

fn capture<T: Send + 'static>() -> (
    Arc<Mutex<Option<EngineResult<T>>>>,
    impl FnOnce(EngineResult<T>) + Send + 'static,
) {
    let slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    (slot, move |result| *sink.lock() = Some(result))
}

#[test]
fn second_operation_is_busy() {
    let sim = Simulation::new(SimConfig::default());
    let (uploaded, done) = capture::<()>();
    sim.engine()
        .start_upload(sim.target(), MissionType::Mission, waypoints(3), done);
    assert_eq!(sim.engine().slot_state(sim.target()), SlotState::Transferring);

    let (command, done) = capture::<()>();
    sim.engine().invoke_command(
        sim.target(),
        CommandCode::ARM_DISARM,
        &[1.0],
        RetryPolicy::default(),
        done,
    );
    assert_eq!(*command.lock(), Some(Err(EngineError::Busy(sim.target()))));

    let (download, done) = capture::<Vec<MissionItem>>();
    sim.engine()
        .start_download(sim.target(), MissionType::Mission, done);
    assert!(matches!(*download.lock(), Some(Err(EngineError::Busy(_)))));

    sim.pump();
    // The rejected requests never reached the vehicle.
    assert!(sim.vehicle().received_commands().is_empty());
    assert_eq!(*uploaded.lock(), Some(Ok(())));
    assert_eq!(sim.engine().slot_state(sim.target()), SlotState::Idle);
}

#[test]
fn tolerates_loss_up_to_the_retry_budget() {
    let retries = 3;
    let sim = Simulation::new(short_mission_policy(retries));
    sim.link()
        .drop_next(Direction::Uplink, Some(MessageKind::MissionItem), retries);

    let items = waypoints(4);
    sim.upload(MissionType::Mission, items.clone()).unwrap();
    assert_eq!(sim.vehicle().mission(MissionType::Mission), items);
    assert_eq!(sim.elapsed(), Duration::from_millis(250) * retries);
}

#[test]
fn exhausted_budget_times_out() {
    let retries = 3;
    let sim = Simulation::new(short_mission_policy(retries));
    sim.link()
        .drop_next(Direction::Uplink, Some(MessageKind::MissionItem), retries + 1);

    let result = sim.upload(MissionType::Mission, waypoints(4));
    assert_eq!(result, Err(EngineError::TimedOut));
    assert_eq!(sim.engine().slot_state(sim.target()), SlotState::Idle);
}

#[test]
fn lost_download_replies_are_rerequested() {
    let sim = Simulation::new(short_mission_policy(2));
    let items = interleaved_mission();
    sim.vehicle()
        .replace_mission(MissionType::Mission, items.clone());
    sim.link()
        .drop_next(Direction::Downlink, Some(MessageKind::MissionCount), 1);
    sim.link()
        .drop_next(Direction::Downlink, Some(MessageKind::MissionItem), 2);

    assert_eq!(sim.download(MissionType::Mission).unwrap(), items);
    assert_eq!(sim.elapsed(), Duration::from_millis(750));
}

#[test]
fn random_loss_is_survivable() {
    for seed in [1, 7, 42] {
        let config = SimConfig::default()
            .with_loss(0.1)
            .with_seed(seed)
            .with_engine(
                EngineConfig::new()
                    .with_mission_policy(RetryPolicy::new(Duration::from_millis(200), 8)),
            );
        let sim = Simulation::new(config);
        let items = waypoints(12);
        sim.upload(MissionType::Mission, items.clone()).unwrap();
        assert_eq!(sim.download(MissionType::Mission).unwrap(), items);
    }
}

#[test]
fn out_of_sequence_item_fails_immediately() {
    let sim = Simulation::new(SimConfig::default());
    sim.vehicle()
        .replace_mission(MissionType::Mission, waypoints(4));
    sim.vehicle().inject_out_of_sequence(1);

    let result = sim.download(MissionType::Mission);
    assert!(matches!(result, Err(EngineError::ProtocolViolation(_))));
    assert_eq!(sim.elapsed(), Duration::ZERO);
}

#[test]
fn early_acceptance_is_a_protocol_violation() {
    let sim = Simulation::new(SimConfig::default());
    sim.vehicle().accept_next_upload_early();

    let result = sim.upload(MissionType::Mission, waypoints(3));
    assert!(matches!(result, Err(EngineError::ProtocolViolation(_))));
}

#[test]
fn rejected_upload_reports_the_vehicle_code() {
    let sim = Simulation::new(SimConfig::default());
    sim.vehicle().reject_next_upload(MissionResultCode::NoSpace);

    let result = sim.upload(MissionType::Mission, waypoints(3));
    assert_eq!(
        result,
        Err(EngineError::Denied(DenialReason::Mission(
            MissionResultCode::NoSpace
        )))
    );
}

#[test]
fn lists_are_independent() {
    let sim = Simulation::new(SimConfig::default());
    let fence = fence_items();
    sim.upload(MissionType::Mission, waypoints(2)).unwrap();
    sim.upload(MissionType::Fence, fence.clone()).unwrap();

    assert_eq!(sim.download(MissionType::Fence).unwrap(), fence);
    assert_eq!(sim.download(MissionType::Mission).unwrap().len(), 2);

    sim.clear(MissionType::All).unwrap();
    assert!(sim.vehicle().mission(MissionType::Fence).is_empty());
    assert!(sim.vehicle().mission(MissionType::Mission).is_empty());
}

fn fence_items() -> Vec<MissionItem> {
    waypoints(3)
        .into_iter()
        .map(|mut item| {
            item.mission_type = MissionType::Fence;
            item
        })
        .collect()
}

#[test]
fn cancel_stops_an_upload() {
    let sim = Simulation::new(SimConfig::default());
    let (result, done) = capture::<()>();
    sim.engine()
        .start_upload(sim.target(), MissionType::Mission, waypoints(5), done);

    assert!(sim.engine().cancel(sim.target()));
    assert_eq!(*result.lock(), Some(Err(EngineError::Cancelled)));
    assert!(!sim.engine().cancel(sim.target()));

    // The vehicle sees the count followed by the cancellation.
    sim.pump();
    assert!(sim.vehicle().mission(MissionType::Mission).is_empty());
    assert_eq!(sim.clock().pending(), 0);

    sim.upload(MissionType::Mission, waypoints(2)).unwrap();
    assert_eq!(sim.vehicle().mission(MissionType::Mission).len(), 2);
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn download_returns_what_was_uploaded(items in mission_strategy(MissionType::Mission, 30)) {
        let sim = Simulation::new(SimConfig::default());
        sim.upload(MissionType::Mission, items.clone()).unwrap();
        prop_assert_eq!(sim.download(MissionType::Mission).unwrap(), items);
    }
}
