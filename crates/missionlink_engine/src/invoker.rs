//! Command invoker.
//!
//! Sends one command and resolves on the matching acknowledgement:
//! - `Accepted` completes with success.
//! - `InProgress` restarts the deadline without consuming a retry.
//! - Any other final result completes with `Denied`.
//! - Silence resends the command up to the retry limit, then `TimedOut`.

use crate::bus::Filter;
use crate::driver::{Exchange, RetryBudget, Step, Steps};
use crate::error::{DenialReason, EngineError};
use missionlink_protocol::{
    CommandCode, CommandLong, CommandParams, CommandResultCode, Envelope, Message, MessageKind,
    Target,
};
use tracing::{debug, trace};

/// A command addressed to one target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandRequest {
    /// Addressee.
    pub target: Target,
    /// Command code.
    pub code: CommandCode,
    /// Up to seven parameters; unused ones are zero.
    pub params: CommandParams,
    /// Correlation number carried on the wire.
    pub transaction: u32,
}

impl CommandRequest {
    /// Builds the wire message.
    pub fn to_message(&self) -> Message {
        Message::CommandLong(CommandLong {
            command: self.code,
            params: self.params,
            transaction: self.transaction,
        })
    }
}

pub(crate) struct CommandExchange {
    request: CommandRequest,
    budget: RetryBudget,
}

impl CommandExchange {
    pub(crate) fn new(request: CommandRequest, retries: u32) -> Self {
        Self {
            request,
            budget: RetryBudget::new(retries),
        }
    }

    fn send(&self) -> Steps<()> {
        vec![Step::Send(self.request.to_message()), Step::Rearm]
    }
}

impl Exchange for CommandExchange {
    type Output = ();

    const NAME: &'static str = "command";

    fn interests(&self) -> Vec<(MessageKind, Filter)> {
        let code = self.request.code;
        vec![(
            MessageKind::CommandAck,
            Box::new(move |env: &Envelope| {
                matches!(&env.message, Message::CommandAck(ack) if ack.command == code)
            }),
        )]
    }

    fn start(&mut self) -> Steps<()> {
        self.budget.progress();
        debug!(target = %self.request.target, command = %self.request.code, "sending command");
        self.send()
    }

    fn on_message(&mut self, envelope: &Envelope) -> Steps<()> {
        let Message::CommandAck(ack) = &envelope.message else {
            return Vec::new();
        };
        if ack.command != self.request.code {
            return Vec::new();
        }

        match ack.result {
            CommandResultCode::Accepted => vec![Step::Finish(Ok(()))],
            CommandResultCode::InProgress => {
                trace!(command = %self.request.code, progress = ack.progress, "command in progress");
                vec![Step::Rearm]
            }
            other => {
                let reason =
                    DenialReason::from_command_result(other).unwrap_or(DenialReason::Rejected);
                vec![Step::Finish(Err(EngineError::Denied(reason)))]
            }
        }
    }

    fn on_timeout(&mut self) -> Steps<()> {
        if !self.budget.consume() {
            return vec![Step::Finish(Err(EngineError::TimedOut))];
        }
        debug!(
            command = %self.request.code,
            attempt = self.budget.sends(),
            "no acknowledgement, resending command"
        );
        self.send()
    }

    fn on_cancel(&mut self) -> Steps<()> {
        vec![Step::Finish(Err(EngineError::Cancelled))]
    }
}
