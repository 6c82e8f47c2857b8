//! Vehicle actions expressed as single commands.

use crate::config::RetryPolicy;
use crate::engine::Engine;
use crate::error::{DenialReason, EngineError};
use missionlink_protocol::{CommandCode, Target};
use std::fmt;

/// Outcome of an action request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionResult {
    /// The vehicle accepted the command.
    Success,
    /// The vehicle is not (or no longer) connected.
    NoSystem,
    /// The command could not be sent.
    ConnectionError,
    /// Another request is in flight, or the vehicle asked to retry later.
    Busy,
    /// The vehicle refused the command.
    CommandDenied,
    /// The vehicle refused the command in its current state.
    CommandDeniedPreconditionUnmet,
    /// The vehicle does not support the command.
    Unsupported,
    /// No acknowledgement arrived.
    Timeout,
    /// The request was cancelled.
    Cancelled,
    /// The vehicle answered out of protocol.
    ProtocolError,
    /// The request was malformed.
    InvalidArgument,
}

impl From<EngineError> for ActionResult {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Busy(_) => Self::Busy,
            EngineError::Denied(DenialReason::TemporarilyRejected) => Self::Busy,
            EngineError::Denied(DenialReason::PreconditionUnmet) => {
                Self::CommandDeniedPreconditionUnmet
            }
            EngineError::Denied(DenialReason::Unsupported) => Self::Unsupported,
            EngineError::Denied(DenialReason::RemoteCancelled) => Self::Cancelled,
            EngineError::Denied(_) => Self::CommandDenied,
            EngineError::TimedOut => Self::Timeout,
            EngineError::ProtocolViolation(_) => Self::ProtocolError,
            EngineError::Transport(_) => Self::ConnectionError,
            EngineError::Cancelled => Self::Cancelled,
            EngineError::Disconnected(_) => Self::NoSystem,
            EngineError::InvalidRequest(_) => Self::InvalidArgument,
        }
    }
}

impl From<Result<(), EngineError>> for ActionResult {
    fn from(result: Result<(), EngineError>) -> Self {
        result.map_or_else(Self::from, |()| Self::Success)
    }
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "Success",
            Self::NoSystem => "No system",
            Self::ConnectionError => "Connection error",
            Self::Busy => "Busy",
            Self::CommandDenied => "Command denied",
            Self::CommandDeniedPreconditionUnmet => "Command denied, precondition unmet",
            Self::Unsupported => "Unsupported",
            Self::Timeout => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::ProtocolError => "Protocol error",
            Self::InvalidArgument => "Invalid argument",
        };
        f.write_str(text)
    }
}

/// Flight-termination magic number for a forced disarm.
const FORCE_DISARM: f32 = 21196.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ActionCommand {
    Arm,
    Disarm,
    Kill,
    Takeoff,
    Land,
    ReturnToLaunch,
    Reboot,
    Shutdown,
    TransitionToFixedwing,
    TransitionToMulticopter,
    GotoLocation {
        latitude_deg: f64,
        longitude_deg: f64,
        altitude_amsl_m: f32,
        yaw_deg: f32,
    },
}

/// Ground speed left to the autopilot.
const DEFAULT_SPEED: f32 = -1.0;
/// Switch to guided flight as part of the reposition.
const REPOSITION_CHANGE_MODE: f32 = 1.0;

impl ActionCommand {
    fn encode(self) -> (CommandCode, [f32; 7]) {
        let unset = f32::NAN;
        match self {
            Self::Arm => (CommandCode::ARM_DISARM, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            Self::Disarm => (CommandCode::ARM_DISARM, [0.0; 7]),
            Self::Kill => (
                CommandCode::ARM_DISARM,
                [0.0, FORCE_DISARM, 0.0, 0.0, 0.0, 0.0, 0.0],
            ),
            // Yaw and position left to the autopilot.
            Self::Takeoff => (
                CommandCode::NAV_TAKEOFF,
                [0.0, 0.0, 0.0, unset, unset, unset, unset],
            ),
            Self::Land => (
                CommandCode::NAV_LAND,
                [0.0, 0.0, 0.0, unset, unset, unset, unset],
            ),
            Self::ReturnToLaunch => (CommandCode::NAV_RETURN_TO_LAUNCH, [0.0; 7]),
            Self::Reboot => (
                CommandCode::PREFLIGHT_REBOOT_SHUTDOWN,
                [1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0],
            ),
            Self::Shutdown => (
                CommandCode::PREFLIGHT_REBOOT_SHUTDOWN,
                [2.0, 2.0, 2.0, 2.0, 0.0, 0.0, 0.0],
            ),
            Self::TransitionToFixedwing => (
                CommandCode::DO_VTOL_TRANSITION,
                [4.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ),
            Self::TransitionToMulticopter => (
                CommandCode::DO_VTOL_TRANSITION,
                [3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ),
            // Parameters are single precision; positions lose well under a metre.
            Self::GotoLocation {
                latitude_deg,
                longitude_deg,
                altitude_amsl_m,
                yaw_deg,
            } => (
                CommandCode::DO_REPOSITION,
                [
                    DEFAULT_SPEED,
                    REPOSITION_CHANGE_MODE,
                    0.0,
                    yaw_deg,
                    latitude_deg as f32,
                    longitude_deg as f32,
                    altitude_amsl_m,
                ],
            ),
        }
    }
}

/// High-level vehicle actions for one target.
///
/// Each action has a callback form (`*_async`) and a blocking form.
#[derive(Debug, Clone)]
pub struct Action {
    engine: Engine,
    target: Target,
    policy: RetryPolicy,
}

impl Action {
    /// Creates the plugin using the engine's default command policy.
    pub fn new(engine: Engine, target: Target) -> Self {
        let policy = engine.config().command;
        Self {
            engine,
            target,
            policy,
        }
    }

    /// Overrides the retry policy for every action.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the target this plugin drives.
    pub fn target(&self) -> Target {
        self.target
    }

    fn send_async(
        &self,
        command: ActionCommand,
        callback: impl FnOnce(ActionResult) + Send + 'static,
    ) {
        let (code, params) = command.encode();
        self.engine
            .invoke_command(self.target, code, &params, self.policy, move |result| {
                callback(ActionResult::from(result))
            });
    }

    fn send(&self, command: ActionCommand) -> ActionResult {
        let (code, params) = command.encode();
        self.engine
            .invoke_command_blocking(self.target, code, &params, self.policy)
            .into()
    }

    /// Arms the vehicle.
    pub fn arm_async(&self, callback: impl FnOnce(ActionResult) + Send + 'static) {
        self.send_async(ActionCommand::Arm, callback);
    }

    /// Arms the vehicle and waits for the result.
    pub fn arm(&self) -> ActionResult {
        self.send(ActionCommand::Arm)
    }

    /// Disarms the vehicle.
    pub fn disarm_async(&self, callback: impl FnOnce(ActionResult) + Send + 'static) {
        self.send_async(ActionCommand::Disarm, callback);
    }

    /// Disarms the vehicle and waits for the result.
    pub fn disarm(&self) -> ActionResult {
        self.send(ActionCommand::Disarm)
    }

    /// Cuts the motors immediately, even in flight.
    pub fn kill_async(&self, callback: impl FnOnce(ActionResult) + Send + 'static) {
        self.send_async(ActionCommand::Kill, callback);
    }

    /// Cuts the motors and waits for the result.
    pub fn kill(&self) -> ActionResult {
        self.send(ActionCommand::Kill)
    }

    /// Takes off to the autopilot's configured altitude.
    pub fn takeoff_async(&self, callback: impl FnOnce(ActionResult) + Send + 'static) {
        self.send_async(ActionCommand::Takeoff, callback);
    }

    /// Takes off and waits for the result.
    pub fn takeoff(&self) -> ActionResult {
        self.send(ActionCommand::Takeoff)
    }

    /// Lands at the current position.
    pub fn land_async(&self, callback: impl FnOnce(ActionResult) + Send + 'static) {
        self.send_async(ActionCommand::Land, callback);
    }

    /// Lands and waits for the result.
    pub fn land(&self) -> ActionResult {
        self.send(ActionCommand::Land)
    }

    /// Returns to the launch position.
    pub fn return_to_launch_async(&self, callback: impl FnOnce(ActionResult) + Send + 'static) {
        self.send_async(ActionCommand::ReturnToLaunch, callback);
    }

    /// Returns to launch and waits for the result.
    pub fn return_to_launch(&self) -> ActionResult {
        self.send(ActionCommand::ReturnToLaunch)
    }

    /// Reboots the autopilot and onboard components.
    pub fn reboot_async(&self, callback: impl FnOnce(ActionResult) + Send + 'static) {
        self.send_async(ActionCommand::Reboot, callback);
    }

    /// Reboots and waits for the result.
    pub fn reboot(&self) -> ActionResult {
        self.send(ActionCommand::Reboot)
    }

    /// Shuts the autopilot and onboard components down.
    pub fn shutdown_async(&self, callback: impl FnOnce(ActionResult) + Send + 'static) {
        self.send_async(ActionCommand::Shutdown, callback);
    }

    /// Shuts down and waits for the result.
    pub fn shutdown(&self) -> ActionResult {
        self.send(ActionCommand::Shutdown)
    }

    /// Flies to a global position and holds there.
    ///
    /// Latitude and longitude are WGS84 degrees, altitude is metres above
    /// mean sea level and yaw is degrees clockwise from north (NaN keeps the
    /// current heading).
    pub fn goto_location_async(
        &self,
        latitude_deg: f64,
        longitude_deg: f64,
        altitude_amsl_m: f32,
        yaw_deg: f32,
        callback: impl FnOnce(ActionResult) + Send + 'static,
    ) {
        let command = ActionCommand::GotoLocation {
            latitude_deg,
            longitude_deg,
            altitude_amsl_m,
            yaw_deg,
        };
        self.send_async(command, callback);
    }

    /// Flies to a global position and waits for the result.
    pub fn goto_location(
        &self,
        latitude_deg: f64,
        longitude_deg: f64,
        altitude_amsl_m: f32,
        yaw_deg: f32,
    ) -> ActionResult {
        self.send(ActionCommand::GotoLocation {
            latitude_deg,
            longitude_deg,
            altitude_amsl_m,
            yaw_deg,
        })
    }

    /// Switches a VTOL vehicle to fixed-wing flight.
    pub fn transition_to_fixedwing_async(
        &self,
        callback: impl FnOnce(ActionResult) + Send + 'static,
    ) {
        self.send_async(ActionCommand::TransitionToFixedwing, callback);
    }

    /// Switches to fixed-wing flight and waits for the result.
    pub fn transition_to_fixedwing(&self) -> ActionResult {
        self.send(ActionCommand::TransitionToFixedwing)
    }

    /// Switches a VTOL vehicle to multicopter flight.
    pub fn transition_to_multicopter_async(
        &self,
        callback: impl FnOnce(ActionResult) + Send + 'static,
    ) {
        self.send_async(ActionCommand::TransitionToMulticopter, callback);
    }

    /// Switches to multicopter flight and waits for the result.
    pub fn transition_to_multicopter(&self) -> ActionResult {
        self.send(ActionCommand::TransitionToMulticopter)
    }
}
