//! Ready-made mission lists.

use missionlink_protocol::{CommandCode, MissionFrame, MissionItem};

const LATITUDES: [f64; 2] = [47.398170, 47.398175];
const LONGITUDES: [f64; 2] = [8.545649, 8.545654];
const ALTITUDES: [f32; 2] = [5.0, 7.5];
const SPEEDS: [f32; 2] = [4.0, 5.0];

/// Converts degrees to the protocol's fixed-point representation.
pub fn degrees_e7(degrees: f64) -> i32 {
    (degrees * 1e7).round() as i32
}

/// Waypoint at `seq` with hold time, acceptance and pass radius of 1.
pub fn waypoint(seq: u16, latitude: f64, longitude: f64, altitude: f32) -> MissionItem {
    let mut item = MissionItem::new(
        seq,
        MissionFrame::GLOBAL_RELATIVE_ALT_INT,
        CommandCode::NAV_WAYPOINT,
    );
    item.param1 = 1.0;
    item.param2 = 1.0;
    item.param3 = 1.0;
    item.param4 = f32::NAN;
    item.x = degrees_e7(latitude);
    item.y = degrees_e7(longitude);
    item.z = altitude;
    item
}

/// Ground speed change at `seq`.
pub fn speed_change(seq: u16, speed: f32) -> MissionItem {
    let mut item = MissionItem::new(seq, MissionFrame::MISSION, CommandCode::DO_CHANGE_SPEED);
    item.param1 = 1.0;
    item.param2 = speed;
    item.param3 = -1.0;
    item.param4 = 0.0;
    item.z = f32::NAN;
    item
}

/// Two waypoints each followed by a speed change; the first is current.
pub fn interleaved_mission() -> Vec<MissionItem> {
    let mut items = Vec::with_capacity(4);
    for i in 0..2 {
        let seq = (i * 2) as u16;
        items.push(waypoint(seq, LATITUDES[i], LONGITUDES[i], ALTITUDES[i]));
        items.push(speed_change(seq + 1, SPEEDS[i]));
    }
    items[0].current = true;
    items
}

/// `n` waypoints on a straight line.
pub fn waypoints(n: u16) -> Vec<MissionItem> {
    (0..n)
        .map(|seq| {
            waypoint(
                seq,
                47.397742 + f64::from(seq) * 1e-4,
                8.545594,
                10.0 + f32::from(seq),
            )
        })
        .collect()
}
