//! Property-based test generators using proptest.
//!
//! Strategies produce mission lists that satisfy the transfer
//! preconditions: contiguous sequence numbers and a single list type.

use missionlink_engine::RetryPolicy;
use missionlink_protocol::{CommandCode, MissionFrame, MissionItem, MissionType};
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use std::time::Duration;

/// Strategy for coordinate frames seen in real missions.
pub fn frame_strategy() -> impl Strategy<Value = MissionFrame> {
    prop_oneof![
        Just(MissionFrame::MISSION),
        Just(MissionFrame::GLOBAL_INT),
        Just(MissionFrame::GLOBAL_RELATIVE_ALT_INT),
    ]
}

/// Strategy for mission item commands.
pub fn command_strategy() -> impl Strategy<Value = CommandCode> {
    prop_oneof![
        Just(CommandCode::NAV_WAYPOINT),
        Just(CommandCode::NAV_TAKEOFF),
        Just(CommandCode::NAV_LAND),
        Just(CommandCode::NAV_RETURN_TO_LAUNCH),
        Just(CommandCode::DO_CHANGE_SPEED),
    ]
}

/// Strategy for item parameters, including the NaN "unset" marker.
pub fn param_strategy() -> impl Strategy<Value = f32> {
    prop_oneof![
        4 => -1000.0f32..1000.0,
        1 => Just(f32::NAN),
    ]
}

/// Strategy for a single item. The sequence number is left at 0.
pub fn item_strategy(mission_type: MissionType) -> impl Strategy<Value = MissionItem> {
    (
        frame_strategy(),
        command_strategy(),
        any::<bool>(),
        prop::array::uniform4(param_strategy()),
        -900_000_000i32..900_000_000,
        -1_800_000_000i32..1_800_000_000,
        param_strategy(),
    )
        .prop_map(move |(frame, command, autocontinue, params, x, y, z)| {
            let mut item = MissionItem::new(0, frame, command);
            item.autocontinue = autocontinue;
            item.param1 = params[0];
            item.param2 = params[1];
            item.param3 = params[2];
            item.param4 = params[3];
            item.x = x;
            item.y = y;
            item.z = z;
            item.mission_type = mission_type;
            item
        })
}

/// Strategy for a transferable list of up to `max_len` items.
pub fn mission_strategy(
    mission_type: MissionType,
    max_len: usize,
) -> impl Strategy<Value = Vec<MissionItem>> {
    prop::collection::vec(item_strategy(mission_type), 0..=max_len).prop_map(|mut items| {
        for (seq, item) in items.iter_mut().enumerate() {
            item.seq = seq as u16;
        }
        if let Some(first) = items.first_mut() {
            first.current = true;
        }
        items
    })
}

/// Strategy for retry policies short enough for simulated runs.
pub fn retry_policy_strategy() -> impl Strategy<Value = RetryPolicy> {
    (50u64..2000, 0u32..5)
        .prop_map(|(ms, retries)| RetryPolicy::new(Duration::from_millis(ms), retries))
}

/// Configuration for property-based tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 128,
            max_shrink_iters: 500,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 24,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 512,
            max_shrink_iters: 5000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
