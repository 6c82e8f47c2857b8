//! Mission list messages.
//!
//! The same message family carries several logical lists (the main
//! mission, geofence, rally points). Every message names the list it
//! belongs to through its [`MissionType`].
//!
//! # Upload (client → vehicle)
//!
//! 1. Client sends `MissionCount`
//! 2. Vehicle sends `MissionRequest` for each sequence number it wants
//! 3. Client answers each request with the matching `MissionItem`
//! 4. Vehicle sends `MissionAck` with the final result
//!
//! # Download (vehicle → client)
//!
//! 1. Client sends `MissionRequestList`
//! 2. Vehicle answers with `MissionCount`
//! 3. Client sends `MissionRequest` for 0, 1, ... count-1
//! 4. Vehicle answers each with a `MissionItem`
//! 5. Client sends `MissionAck`

use crate::command::CommandCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Selects which logical list a transfer or item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MissionType {
    /// Main mission items.
    Mission,
    /// Geofence definition.
    Fence,
    /// Rally points.
    Rally,
    /// Every list at once (only meaningful for clearing).
    All,
}

impl MissionType {
    /// Returns the numeric wire value.
    pub fn code(self) -> u8 {
        match self {
            Self::Mission => 0,
            Self::Fence => 1,
            Self::Rally => 2,
            Self::All => 255,
        }
    }

    /// Parses a numeric wire value.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Mission),
            1 => Some(Self::Fence),
            2 => Some(Self::Rally),
            255 => Some(Self::All),
            _ => None,
        }
    }

    /// Returns true if items can be transferred for this type.
    pub fn is_transferable(self) -> bool {
        !matches!(self, Self::All)
    }
}

impl fmt::Display for MissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mission => "mission",
            Self::Fence => "fence",
            Self::Rally => "rally",
            Self::All => "all",
        };
        f.write_str(name)
    }
}

/// Coordinate frame of a mission item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissionFrame(pub u8);

impl MissionFrame {
    /// Non-positional mission command.
    pub const MISSION: Self = Self(2);
    /// Global WGS84, altitude above mean sea level, scaled integer lat/lon.
    pub const GLOBAL_INT: Self = Self(5);
    /// Global WGS84, altitude relative to home, scaled integer lat/lon.
    pub const GLOBAL_RELATIVE_ALT_INT: Self = Self(6);
}

/// One ordered step of a mission list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MissionItem {
    /// Zero-based position in the list.
    pub seq: u16,
    /// Coordinate frame.
    pub frame: MissionFrame,
    /// Command executed at this step.
    pub command: CommandCode,
    /// Whether this is the current item.
    pub current: bool,
    /// Whether to continue to the next item automatically.
    pub autocontinue: bool,
    /// Parameter 1.
    pub param1: f32,
    /// Parameter 2.
    pub param2: f32,
    /// Parameter 3.
    pub param3: f32,
    /// Parameter 4.
    pub param4: f32,
    /// Latitude (degrees * 1e7) or local x.
    pub x: i32,
    /// Longitude (degrees * 1e7) or local y.
    pub y: i32,
    /// Altitude or local z.
    pub z: f32,
    /// List this item belongs to.
    pub mission_type: MissionType,
}

impl MissionItem {
    /// Creates an item with zeroed parameters.
    pub fn new(seq: u16, frame: MissionFrame, command: CommandCode) -> Self {
        Self {
            seq,
            frame,
            command,
            current: false,
            autocontinue: true,
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            x: 0,
            y: 0,
            z: 0.0,
            mission_type: MissionType::Mission,
        }
    }
}

// NaN marks "unset" in several parameters, so two NaNs compare equal here.
fn same_float(a: f32, b: f32) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

impl PartialEq for MissionItem {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
            && self.frame == other.frame
            && self.command == other.command
            && self.current == other.current
            && self.autocontinue == other.autocontinue
            && same_float(self.param1, other.param1)
            && same_float(self.param2, other.param2)
            && same_float(self.param3, other.param3)
            && same_float(self.param4, other.param4)
            && self.x == other.x
            && self.y == other.y
            && same_float(self.z, other.z)
            && self.mission_type == other.mission_type
    }
}

/// Result code carried by a mission acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionResultCode {
    /// Mission accepted.
    Accepted,
    /// Generic error.
    Error,
    /// Coordinate frame not supported.
    UnsupportedFrame,
    /// Command not supported.
    Unsupported,
    /// Not enough space for the list.
    NoSpace,
    /// One of the parameters has an invalid value.
    Invalid,
    /// Parameter 1 has an invalid value.
    InvalidParam1,
    /// Parameter 2 has an invalid value.
    InvalidParam2,
    /// Parameter 3 has an invalid value.
    InvalidParam3,
    /// Parameter 4 has an invalid value.
    InvalidParam4,
    /// x has an invalid value.
    InvalidParam5X,
    /// y has an invalid value.
    InvalidParam6Y,
    /// z has an invalid value.
    InvalidParam7,
    /// Item received out of sequence.
    InvalidSequence,
    /// Not accepting mission commands right now.
    Denied,
    /// The current transfer was cancelled.
    OperationCancelled,
}

impl MissionResultCode {
    /// Returns the numeric wire value.
    pub fn code(self) -> u8 {
        match self {
            Self::Accepted => 0,
            Self::Error => 1,
            Self::UnsupportedFrame => 2,
            Self::Unsupported => 3,
            Self::NoSpace => 4,
            Self::Invalid => 5,
            Self::InvalidParam1 => 6,
            Self::InvalidParam2 => 7,
            Self::InvalidParam3 => 8,
            Self::InvalidParam4 => 9,
            Self::InvalidParam5X => 10,
            Self::InvalidParam6Y => 11,
            Self::InvalidParam7 => 12,
            Self::InvalidSequence => 13,
            Self::Denied => 14,
            Self::OperationCancelled => 15,
        }
    }
}

impl fmt::Display for MissionResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Announces the number of items in a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionCount {
    /// Number of items.
    pub count: u16,
    /// List being described.
    pub mission_type: MissionType,
    /// Identity of the stored list; 0 when the sender does not track one.
    pub opaque_id: u32,
}

/// Asks the vehicle for the item count of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionRequestList {
    /// List being requested.
    pub mission_type: MissionType,
}

/// Asks the peer for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionRequest {
    /// Requested sequence number.
    pub seq: u16,
    /// List being transferred.
    pub mission_type: MissionType,
}

/// Final acknowledgement of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionAck {
    /// Result of the transfer.
    pub result: MissionResultCode,
    /// List being acknowledged.
    pub mission_type: MissionType,
    /// Identity of the list now stored; 0 when not tracked.
    pub opaque_id: u32,
}

impl MissionAck {
    /// Creates an acknowledgement without a list identity.
    pub fn new(result: MissionResultCode, mission_type: MissionType) -> Self {
        Self {
            result,
            mission_type,
            opaque_id: 0,
        }
    }
}

/// Deletes a stored list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionClearAll {
    /// List to delete.
    pub mission_type: MissionType,
}

/// Unsolicited status broadcast describing a stored list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionStatus {
    /// Sequence number of the current item.
    pub current_seq: u16,
    /// Number of items in the list.
    pub total: u16,
    /// List being described.
    pub mission_type: MissionType,
    /// Identity of the stored list; 0 when not tracked.
    pub opaque_id: u32,
}
