//! Error types for the engine.

use crate::bus::TransportError;
use missionlink_protocol::{CommandResultCode, MissionResultCode, ProtocolError, Target};
use std::fmt;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Why the remote rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// Request is invalid or not allowed.
    Rejected,
    /// Request cannot be executed right now.
    TemporarilyRejected,
    /// Request is valid but the vehicle's preconditions are not met.
    PreconditionUnmet,
    /// Request is not supported by the remote.
    Unsupported,
    /// Remote cancelled the request.
    RemoteCancelled,
    /// Mission transfer rejected with the given code.
    Mission(MissionResultCode),
}

impl DenialReason {
    /// Maps a final command result code.
    ///
    /// Returns `None` for results that are not a denial.
    pub fn from_command_result(result: CommandResultCode) -> Option<Self> {
        match result {
            CommandResultCode::Accepted | CommandResultCode::InProgress => None,
            CommandResultCode::TemporarilyRejected => Some(Self::TemporarilyRejected),
            CommandResultCode::Denied => Some(Self::Rejected),
            CommandResultCode::Unsupported => Some(Self::Unsupported),
            CommandResultCode::Failed => Some(Self::PreconditionUnmet),
            CommandResultCode::Cancelled => Some(Self::RemoteCancelled),
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => f.write_str("rejected"),
            Self::TemporarilyRejected => f.write_str("temporarily rejected"),
            Self::PreconditionUnmet => f.write_str("precondition unmet"),
            Self::Unsupported => f.write_str("unsupported"),
            Self::RemoteCancelled => f.write_str("cancelled by remote"),
            Self::Mission(code) => write!(f, "mission result {code}"),
        }
    }
}

/// Terminal failure of a command or mission transfer.
///
/// Every variant is delivered through the same completion path as success.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Another operation is already in flight for the target.
    #[error("another operation is in flight for target {0}")]
    Busy(Target),

    /// The remote explicitly rejected the request.
    #[error("denied by remote: {0}")]
    Denied(DenialReason),

    /// Retries were exhausted without a response.
    #[error("timed out waiting for response")]
    TimedOut,

    /// The remote sent a malformed or out-of-sequence response.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Sending failed at the transport boundary.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The caller aborted the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The target was torn down while the operation was in flight.
    #[error("target {0} disconnected")]
    Disconnected(Target),

    /// The request was rejected locally before anything was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl EngineError {
    /// Creates a protocol violation.
    pub fn violation(message: impl Into<String>) -> Self {
        Self::ProtocolViolation(message.into())
    }

    /// Creates an invalid request error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Returns true if the remote answered with a rejection.
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::Denied(_))
    }
}

impl From<ProtocolError> for EngineError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::TooManyParams(_) => Self::InvalidRequest(err.to_string()),
            ProtocolError::Encode(_) | ProtocolError::Decode(_) => {
                Self::Transport(TransportError::new(err.to_string()))
            }
        }
    }
}
