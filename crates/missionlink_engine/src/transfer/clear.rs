use crate::bus::Filter;
use crate::driver::{Exchange, RetryBudget, Step, Steps};
use crate::error::{DenialReason, EngineError};
use crate::notifier::{Baseline, MissionFingerprint};
use missionlink_protocol::{
    Envelope, Message, MessageKind, MissionClearAll, MissionResultCode, MissionType, Target,
};
use tracing::debug;

/// Deletes a stored list and waits for the acknowledgement.
pub(crate) struct ClearExchange {
    target: Target,
    mission_type: MissionType,
    budget: RetryBudget,
    accepted_by: Option<(Target, u32)>,
}

impl ClearExchange {
    pub(crate) fn new(target: Target, mission_type: MissionType, retries: u32) -> Self {
        Self {
            target,
            mission_type,
            budget: RetryBudget::new(retries),
            accepted_by: None,
        }
    }

    fn send(&self) -> Steps<()> {
        vec![
            Step::Send(Message::MissionClearAll(MissionClearAll {
                mission_type: self.mission_type,
            })),
            Step::Rearm,
        ]
    }

    fn cleared_types(&self) -> &'static [MissionType] {
        match self.mission_type {
            MissionType::Mission => &[MissionType::Mission],
            MissionType::Fence => &[MissionType::Fence],
            MissionType::Rally => &[MissionType::Rally],
            MissionType::All => &[MissionType::Mission, MissionType::Fence, MissionType::Rally],
        }
    }
}

impl Exchange for ClearExchange {
    type Output = ();

    const NAME: &'static str = "mission clear";

    fn interests(&self) -> Vec<(MessageKind, Filter)> {
        let mission_type = self.mission_type;
        vec![(
            MessageKind::MissionAck,
            Box::new(move |env: &Envelope| {
                matches!(&env.message, Message::MissionAck(ack) if ack.mission_type == mission_type)
            }),
        )]
    }

    fn start(&mut self) -> Steps<()> {
        debug!(target = %self.target, mission_type = %self.mission_type, "clearing mission");
        self.budget.progress();
        self.send()
    }

    fn on_message(&mut self, envelope: &Envelope) -> Steps<()> {
        let Message::MissionAck(ack) = &envelope.message else {
            return Vec::new();
        };
        if ack.mission_type != self.mission_type {
            return Vec::new();
        }
        if ack.result != MissionResultCode::Accepted {
            return vec![Step::Finish(Err(EngineError::Denied(DenialReason::Mission(
                ack.result,
            ))))];
        }
        self.accepted_by = Some((envelope.source, ack.opaque_id));
        vec![Step::Finish(Ok(()))]
    }

    fn on_timeout(&mut self) -> Steps<()> {
        if !self.budget.consume() {
            return vec![Step::Finish(Err(EngineError::TimedOut))];
        }
        debug!(target = %self.target, "no acknowledgement, resending clear");
        self.send()
    }

    fn on_cancel(&mut self) -> Steps<()> {
        vec![Step::Finish(Err(EngineError::Cancelled))]
    }

    fn baselines(&self) -> Vec<Baseline> {
        let Some((source, opaque_id)) = self.accepted_by else {
            return Vec::new();
        };
        self.cleared_types()
            .iter()
            .map(|mission_type| Baseline {
                source,
                mission_type: *mission_type,
                fingerprint: MissionFingerprint::new(0, opaque_id),
            })
            .collect()
    }
}
