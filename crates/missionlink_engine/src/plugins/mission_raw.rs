//! Raw mission list access for one target.

use crate::engine::Engine;
use crate::error::{DenialReason, EngineError, EngineResult};
use crate::notifier::ChangeSubscription;
use missionlink_protocol::{MissionItem, MissionResultCode, MissionType, Target};
use std::fmt;

/// Outcome of a mission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionRawResult {
    /// Request succeeded.
    Success,
    /// The vehicle reported a generic error.
    Error,
    /// The list does not fit on the vehicle.
    TooManyMissionItems,
    /// Another request is in flight.
    Busy,
    /// No response arrived.
    Timeout,
    /// The list was malformed.
    InvalidArgument,
    /// The vehicle does not support the list or one of its items.
    Unsupported,
    /// The transfer was cancelled.
    TransferCancelled,
    /// The vehicle is not (or no longer) connected.
    NoSystem,
    /// The request could not be sent.
    ConnectionError,
    /// The vehicle answered out of protocol.
    ProtocolError,
    /// The vehicle refused the request.
    Denied,
}

impl From<EngineError> for MissionRawResult {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Busy(_) => Self::Busy,
            EngineError::Denied(DenialReason::Mission(code)) => match code {
                MissionResultCode::NoSpace => Self::TooManyMissionItems,
                MissionResultCode::Unsupported | MissionResultCode::UnsupportedFrame => {
                    Self::Unsupported
                }
                MissionResultCode::OperationCancelled => Self::TransferCancelled,
                MissionResultCode::Error => Self::Error,
                _ => Self::Denied,
            },
            EngineError::Denied(_) => Self::Denied,
            EngineError::TimedOut => Self::Timeout,
            EngineError::ProtocolViolation(_) => Self::ProtocolError,
            EngineError::Transport(_) => Self::ConnectionError,
            EngineError::Cancelled => Self::TransferCancelled,
            EngineError::Disconnected(_) => Self::NoSystem,
            EngineError::InvalidRequest(_) => Self::InvalidArgument,
        }
    }
}

impl From<EngineResult<()>> for MissionRawResult {
    fn from(result: EngineResult<()>) -> Self {
        result.map_or_else(Self::from, |()| Self::Success)
    }
}

impl fmt::Display for MissionRawResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "Success",
            Self::Error => "Error",
            Self::TooManyMissionItems => "Too many mission items",
            Self::Busy => "Busy",
            Self::Timeout => "Timeout",
            Self::InvalidArgument => "Invalid argument",
            Self::Unsupported => "Unsupported",
            Self::TransferCancelled => "Transfer cancelled",
            Self::NoSystem => "No system",
            Self::ConnectionError => "Connection error",
            Self::ProtocolError => "Protocol error",
            Self::Denied => "Denied",
        };
        f.write_str(text)
    }
}

/// Uploads, downloads and clears one list type of one target.
#[derive(Debug, Clone)]
pub struct MissionRaw {
    engine: Engine,
    target: Target,
    mission_type: MissionType,
}

impl MissionRaw {
    /// Creates the plugin for the flight plan list.
    pub fn new(engine: Engine, target: Target) -> Self {
        Self {
            engine,
            target,
            mission_type: MissionType::Mission,
        }
    }

    /// Selects another list type (fence or rally points).
    pub fn with_mission_type(mut self, mission_type: MissionType) -> Self {
        self.mission_type = mission_type;
        self
    }

    /// Uploads `items`, replacing the stored list.
    pub fn upload_mission_async(
        &self,
        items: Vec<MissionItem>,
        callback: impl FnOnce(MissionRawResult) + Send + 'static,
    ) {
        self.engine
            .start_upload(self.target, self.mission_type, items, move |result| {
                callback(result.into())
            });
    }

    /// Uploads `items` and waits for the result.
    pub fn upload_mission(&self, items: Vec<MissionItem>) -> MissionRawResult {
        self.engine
            .upload_blocking(self.target, self.mission_type, items)
            .into()
    }

    /// Downloads the stored list.
    pub fn download_mission_async(
        &self,
        callback: impl FnOnce(Result<Vec<MissionItem>, MissionRawResult>) + Send + 'static,
    ) {
        self.engine
            .start_download(self.target, self.mission_type, move |result| {
                callback(result.map_err(MissionRawResult::from))
            });
    }

    /// Downloads the stored list and waits for it.
    pub fn download_mission(&self) -> Result<Vec<MissionItem>, MissionRawResult> {
        self.engine
            .download_blocking(self.target, self.mission_type)
            .map_err(MissionRawResult::from)
    }

    /// Deletes the stored list.
    pub fn clear_mission_async(&self, callback: impl FnOnce(MissionRawResult) + Send + 'static) {
        self.engine
            .clear_mission(self.target, self.mission_type, move |result| {
                callback(result.into())
            });
    }

    /// Deletes the stored list and waits for the result.
    pub fn clear_mission(&self) -> MissionRawResult {
        self.engine
            .clear_blocking(self.target, self.mission_type)
            .into()
    }

    /// Cancels an upload or download in flight.
    ///
    /// Returns false if nothing was in flight.
    pub fn cancel_mission_transfer(&self) -> bool {
        self.engine.cancel(self.target)
    }

    /// Calls `handler` whenever the stored lists change on the vehicle.
    pub fn subscribe_mission_changed(
        &self,
        handler: impl Fn() + Send + Sync + 'static,
    ) -> ChangeSubscription {
        self.engine.on_mission_changed(self.target, handler)
    }

    /// Removes a handler added by [`MissionRaw::subscribe_mission_changed`].
    pub fn unsubscribe_mission_changed(&self, subscription: ChangeSubscription) -> bool {
        self.engine.unsubscribe_mission_changed(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mission_denials_keep_their_meaning() {
        let denied = |code| EngineError::Denied(DenialReason::Mission(code));
        assert_eq!(
            MissionRawResult::from(denied(MissionResultCode::NoSpace)),
            MissionRawResult::TooManyMissionItems
        );
        assert_eq!(
            MissionRawResult::from(denied(MissionResultCode::UnsupportedFrame)),
            MissionRawResult::Unsupported
        );
        assert_eq!(
            MissionRawResult::from(denied(MissionResultCode::InvalidSequence)),
            MissionRawResult::Denied
        );
    }

    #[test]
    fn local_failures_map() {
        assert_eq!(MissionRawResult::from(Ok(())), MissionRawResult::Success);
        assert_eq!(
            MissionRawResult::from(EngineError::Cancelled),
            MissionRawResult::TransferCancelled
        );
        assert_eq!(
            MissionRawResult::from(EngineError::violation("gap")),
            MissionRawResult::ProtocolError
        );
        assert_eq!(
            MissionRawResult::from(EngineError::Disconnected(Target::system(1))),
            MissionRawResult::NoSystem
        );
        assert_eq!(
            MissionRawResult::TooManyMissionItems.to_string(),
            "Too many mission items"
        );
    }
}
