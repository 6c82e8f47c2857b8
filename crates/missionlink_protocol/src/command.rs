//! Command request and acknowledgement messages.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A command code understood by the remote autopilot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandCode(pub u16);

impl CommandCode {
    /// Navigate to a waypoint (mission items).
    pub const NAV_WAYPOINT: Self = Self(16);
    /// Return to launch location.
    pub const NAV_RETURN_TO_LAUNCH: Self = Self(20);
    /// Land at location.
    pub const NAV_LAND: Self = Self(21);
    /// Take off from the ground.
    pub const NAV_TAKEOFF: Self = Self(22);
    /// Change speed (mission items).
    pub const DO_CHANGE_SPEED: Self = Self(178);
    /// Fly to a global position and hold there.
    pub const DO_REPOSITION: Self = Self(192);
    /// Terminate flight immediately.
    pub const DO_FLIGHT_TERMINATION: Self = Self(185);
    /// Reboot or shut down system components.
    pub const PREFLIGHT_REBOOT_SHUTDOWN: Self = Self(246);
    /// Arm or disarm the vehicle.
    pub const ARM_DISARM: Self = Self(400);
    /// Hybrid/VTOL transition.
    pub const DO_VTOL_TRANSITION: Self = Self(3000);

    /// Returns the raw code.
    pub fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

/// The seven numeric parameters of a command.
///
/// Unused parameters are zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandParams(pub [f32; 7]);

impl CommandParams {
    /// Maximum number of parameters a command carries.
    pub const MAX: usize = 7;

    /// Builds parameters from a slice of at most seven values.
    pub fn from_slice(values: &[f32]) -> ProtocolResult<Self> {
        if values.len() > Self::MAX {
            return Err(ProtocolError::TooManyParams(values.len()));
        }
        let mut params = [0.0f32; Self::MAX];
        params[..values.len()].copy_from_slice(values);
        Ok(Self(params))
    }

    /// Returns parameter `index` (1-based, as the protocol numbers them).
    pub fn get(&self, index: usize) -> Option<f32> {
        index
            .checked_sub(1)
            .and_then(|i| self.0.get(i))
            .copied()
    }
}

/// A command request as it goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommandLong {
    /// Command to execute.
    pub command: CommandCode,
    /// Command parameters.
    pub params: CommandParams,
    /// Transaction identity; identical for every resend of one request.
    pub transaction: u32,
}

/// Result code carried by a command acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandResultCode {
    /// Command is valid and was executed.
    Accepted,
    /// Command is valid but cannot be executed right now.
    TemporarilyRejected,
    /// Command is invalid or not allowed.
    Denied,
    /// Command is not supported.
    Unsupported,
    /// Command is valid but its execution failed (preconditions unmet).
    Failed,
    /// Command is being executed; a final result follows.
    InProgress,
    /// Command was cancelled by the remote.
    Cancelled,
}

impl CommandResultCode {
    /// Returns the numeric wire value.
    pub fn code(self) -> u8 {
        match self {
            Self::Accepted => 0,
            Self::TemporarilyRejected => 1,
            Self::Denied => 2,
            Self::Unsupported => 3,
            Self::Failed => 4,
            Self::InProgress => 5,
            Self::Cancelled => 6,
        }
    }

    /// Parses a numeric wire value.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Accepted),
            1 => Some(Self::TemporarilyRejected),
            2 => Some(Self::Denied),
            3 => Some(Self::Unsupported),
            4 => Some(Self::Failed),
            5 => Some(Self::InProgress),
            6 => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns true if the acknowledgement ends the exchange.
    pub fn is_final(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Acknowledgement of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    /// Command being acknowledged.
    pub command: CommandCode,
    /// Outcome reported by the remote.
    pub result: CommandResultCode,
    /// Progress percentage for in-progress results.
    pub progress: u8,
}

impl CommandAck {
    /// Creates an acknowledgement with no progress information.
    pub fn new(command: CommandCode, result: CommandResultCode) -> Self {
        Self {
            command,
            result,
            progress: 0,
        }
    }
}
