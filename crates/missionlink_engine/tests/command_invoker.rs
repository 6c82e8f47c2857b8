//! End-to-end command tests against the simulated vehicle.

use missionlink_engine::{DenialReason, EngineError, RetryPolicy};
use missionlink_protocol::{CommandAck, CommandCode, CommandResultCode, Message, MessageKind};
use missionlink_testkit::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn arm(sim: &Simulation, policy: RetryPolicy) -> Result<(), EngineError> {
    sim.command(CommandCode::ARM_DISARM, &[1.0], policy)
}

#[test]
fn accepted_command_completes_without_waiting() {
    let sim = Simulation::new(SimConfig::default());
    arm(&sim, RetryPolicy::default()).unwrap();
    assert!(sim.vehicle().is_armed());
    assert_eq!(sim.elapsed(), Duration::ZERO);
    assert_eq!(sim.clock().pending(), 0);
}

#[test]
fn silent_vehicle_times_out_after_every_attempt() {
    let sim = Simulation::new(SimConfig::default());
    sim.vehicle()
        .set_command_behavior(CommandCode::ARM_DISARM, CommandBehavior::Silent);

    let timeout = Duration::from_secs(1);
    let result = arm(&sim, RetryPolicy::new(timeout, 3));
    assert_eq!(result, Err(EngineError::TimedOut));

    let elapsed = sim.elapsed();
    assert!(elapsed >= timeout * 3, "resolved too early: {elapsed:?}");
    assert!(elapsed <= timeout * 4, "resolved too late: {elapsed:?}");
    assert_eq!(sim.vehicle().received_commands().len(), 4);
}

#[test]
fn resends_keep_the_same_request() {
    let sim = Simulation::new(SimConfig::default());
    sim.link()
        .drop_next(Direction::Downlink, Some(MessageKind::CommandAck), 2);

    let params = [0.0, 0.0, 0.0, 90.0, 0.0, 0.0, 10.0];
    sim.command(CommandCode::NAV_TAKEOFF, &params, RetryPolicy::default())
        .unwrap();

    let received = sim.vehicle().received_commands();
    assert_eq!(received.len(), 3);
    assert!(received.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn in_progress_extends_the_deadline() {
    let sim = Simulation::new(SimConfig::default());
    sim.vehicle().set_command_behavior(
        CommandCode::PREFLIGHT_REBOOT_SHUTDOWN,
        CommandBehavior::result(CommandResultCode::InProgress),
    );

    let policy = RetryPolicy::no_retry(Duration::from_millis(500));
    let engine = sim.engine().clone();
    let result = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&result);
    engine.invoke_command(
        sim.target(),
        CommandCode::PREFLIGHT_REBOOT_SHUTDOWN,
        &[1.0],
        policy,
        move |r| *sink.lock() = Some(r),
    );
    sim.pump();
    assert!(result.lock().is_none());

    // A progress report restarts the wait without consuming a resend.
    sim.clock().advance(Duration::from_millis(400));
    sim.link().inject(Message::CommandAck(CommandAck::new(
        CommandCode::PREFLIGHT_REBOOT_SHUTDOWN,
        CommandResultCode::InProgress,
    )));
    sim.pump();
    sim.clock().advance(Duration::from_millis(400));
    assert!(result.lock().is_none());

    sim.clock().advance(Duration::from_millis(100));
    assert_eq!(*result.lock(), Some(Err(EngineError::TimedOut)));
    assert_eq!(sim.vehicle().received_commands().len(), 1);
}

#[test]
fn progress_then_acceptance() {
    let sim = Simulation::new(SimConfig::default());
    sim.vehicle().set_command_behavior(
        CommandCode::DO_VTOL_TRANSITION,
        CommandBehavior::Reply(vec![
            CommandResultCode::InProgress,
            CommandResultCode::InProgress,
            CommandResultCode::Accepted,
        ]),
    );
    sim.command(CommandCode::DO_VTOL_TRANSITION, &[4.0], RetryPolicy::default())
        .unwrap();
}

#[test]
fn denials_map_to_reasons() {
    let cases = [
        (CommandResultCode::Denied, DenialReason::Rejected),
        (
            CommandResultCode::TemporarilyRejected,
            DenialReason::TemporarilyRejected,
        ),
        (CommandResultCode::Unsupported, DenialReason::Unsupported),
        (CommandResultCode::Failed, DenialReason::PreconditionUnmet),
        (CommandResultCode::Cancelled, DenialReason::RemoteCancelled),
    ];
    for (code, reason) in cases {
        let sim = Simulation::new(SimConfig::default());
        sim.vehicle()
            .set_command_behavior(CommandCode::NAV_LAND, CommandBehavior::result(code));
        let result = sim.command(CommandCode::NAV_LAND, &[], RetryPolicy::default());
        assert_eq!(result, Err(EngineError::Denied(reason)), "{code:?}");
        // Denials are final: no resend.
        assert_eq!(sim.vehicle().received_commands().len(), 1);
    }
}

#[test]
fn transport_failure_is_reported() {
    let sim = Simulation::new(SimConfig::default());
    sim.link().set_fail_sends(true);
    let result = arm(&sim, RetryPolicy::default());
    assert!(matches!(result, Err(EngineError::Transport(_))));

    sim.link().set_fail_sends(false);
    arm(&sim, RetryPolicy::default()).unwrap();
}

#[test]
fn disconnect_aborts_the_command() {
    let sim = Simulation::new(SimConfig::default());
    sim.vehicle()
        .set_command_behavior(CommandCode::ARM_DISARM, CommandBehavior::Silent);

    let result = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&result);
    sim.engine().invoke_command(
        sim.target(),
        CommandCode::ARM_DISARM,
        &[1.0],
        RetryPolicy::default(),
        move |r| *sink.lock() = Some(r),
    );
    sim.pump();

    assert_eq!(sim.engine().target_disconnected(sim.target()), 1);
    assert_eq!(
        *result.lock(),
        Some(Err(EngineError::Disconnected(sim.target())))
    );
    assert_eq!(sim.clock().pending(), 0);
}
