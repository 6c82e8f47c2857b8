use super::{for_list, validate_items};
use crate::bus::Filter;
use crate::driver::{Exchange, RetryBudget, Step, Steps};
use crate::error::{DenialReason, EngineError, EngineResult};
use crate::notifier::{Baseline, MissionFingerprint};
use missionlink_protocol::{
    Envelope, Message, MessageKind, MissionAck, MissionCount, MissionItem, MissionResultCode,
    MissionType, Target,
};
use tracing::{debug, warn};

/// Progress of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    /// Not started.
    Idle,
    /// Count announced; waiting for the first item request.
    SendingCount,
    /// Waiting for the next item request.
    AwaitingItemRequests,
    /// Answering an item request.
    SendingItems,
    /// Highest item sent; waiting for the final acknowledgement.
    AwaitingFinalAck,
    /// Remote accepted the list.
    Done,
    /// Terminated with an error.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Artifact {
    Count,
    Item(u16),
}

/// Pushes a list to the remote, answering its item requests.
pub(crate) struct UploadExchange {
    target: Target,
    mission_type: MissionType,
    items: Vec<MissionItem>,
    sent: Vec<bool>,
    phase: UploadPhase,
    last_sent: Artifact,
    budget: RetryBudget,
    accepted_by: Option<(Target, u32)>,
}

impl UploadExchange {
    pub(crate) fn new(
        target: Target,
        mission_type: MissionType,
        items: Vec<MissionItem>,
        retries: u32,
    ) -> EngineResult<Self> {
        validate_items(mission_type, &items)?;
        Ok(Self {
            target,
            mission_type,
            sent: vec![false; items.len()],
            items,
            phase: UploadPhase::Idle,
            last_sent: Artifact::Count,
            budget: RetryBudget::new(retries),
            accepted_by: None,
        })
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> UploadPhase {
        self.phase
    }

    fn count(&self) -> u16 {
        // Bounded by validation.
        u16::try_from(self.items.len()).unwrap_or(u16::MAX)
    }

    fn message(&self, artifact: Artifact) -> Message {
        match artifact {
            Artifact::Count => Message::MissionCount(MissionCount {
                count: self.count(),
                mission_type: self.mission_type,
                opaque_id: 0,
            }),
            Artifact::Item(seq) => Message::MissionItem(self.items[usize::from(seq)]),
        }
    }

    fn send(&mut self, artifact: Artifact) -> Steps<()> {
        self.last_sent = artifact;
        vec![Step::Send(self.message(artifact)), Step::Rearm]
    }

    fn fail(&mut self, error: EngineError) -> Steps<()> {
        self.phase = UploadPhase::Failed;
        vec![Step::Finish(Err(error))]
    }

    fn on_request(&mut self, seq: u16) -> Steps<()> {
        let in_range = seq < self.count();

        if self.phase == UploadPhase::AwaitingFinalAck {
            if !in_range {
                warn!(target = %self.target, seq, "ignoring out-of-range item request");
                return Vec::new();
            }
            let index = usize::from(seq);
            if self.sent[index] {
                debug!(target = %self.target, seq, "item requested again, resending");
            }
            self.sent[index] = true;
            self.budget.progress();
            return self.send(Artifact::Item(seq));
        }

        if !in_range {
            return self.fail(EngineError::violation(format!(
                "item {seq} requested but the list has {} items",
                self.count()
            )));
        }

        let index = usize::from(seq);
        if self.sent[index] {
            debug!(target = %self.target, seq, "item requested again, resending");
        }
        self.phase = UploadPhase::SendingItems;
        self.sent[index] = true;
        self.budget.progress();
        let steps = self.send(Artifact::Item(seq));
        self.phase = if seq + 1 == self.count() {
            UploadPhase::AwaitingFinalAck
        } else {
            UploadPhase::AwaitingItemRequests
        };
        steps
    }

    fn on_ack(&mut self, source: Target, ack: &MissionAck) -> Steps<()> {
        if ack.result != MissionResultCode::Accepted {
            return self.fail(EngineError::Denied(DenialReason::Mission(ack.result)));
        }

        let complete = match self.phase {
            UploadPhase::SendingCount => self.items.is_empty(),
            UploadPhase::AwaitingFinalAck => self.sent.iter().all(|sent| *sent),
            _ => false,
        };
        if !complete {
            let delivered = self.sent.iter().filter(|sent| **sent).count();
            return self.fail(EngineError::violation(format!(
                "list accepted after {delivered} of {} items",
                self.items.len()
            )));
        }

        self.phase = UploadPhase::Done;
        self.accepted_by = Some((source, ack.opaque_id));
        vec![Step::Finish(Ok(()))]
    }
}

impl Exchange for UploadExchange {
    type Output = ();

    const NAME: &'static str = "mission upload";

    fn interests(&self) -> Vec<(MessageKind, Filter)> {
        vec![
            (MessageKind::MissionRequest, for_list(self.mission_type)),
            (MessageKind::MissionAck, for_list(self.mission_type)),
        ]
    }

    fn start(&mut self) -> Steps<()> {
        debug!(
            target = %self.target,
            mission_type = %self.mission_type,
            count = self.items.len(),
            "announcing mission upload"
        );
        self.phase = UploadPhase::SendingCount;
        self.budget.progress();
        self.send(Artifact::Count)
    }

    fn on_message(&mut self, envelope: &Envelope) -> Steps<()> {
        match &envelope.message {
            Message::MissionRequest(request) if request.mission_type == self.mission_type => {
                self.on_request(request.seq)
            }
            Message::MissionAck(ack) if ack.mission_type == self.mission_type => {
                self.on_ack(envelope.source, ack)
            }
            _ => Vec::new(),
        }
    }

    fn on_timeout(&mut self) -> Steps<()> {
        if !self.budget.consume() {
            return self.fail(EngineError::TimedOut);
        }
        debug!(
            target = %self.target,
            artifact = ?self.last_sent,
            "no response, resending"
        );
        self.send(self.last_sent)
    }

    fn on_cancel(&mut self) -> Steps<()> {
        self.phase = UploadPhase::Failed;
        vec![
            Step::Notify(Message::MissionAck(MissionAck::new(
                MissionResultCode::OperationCancelled,
                self.mission_type,
            ))),
            Step::Finish(Err(EngineError::Cancelled)),
        ]
    }

    fn baselines(&self) -> Vec<Baseline> {
        self.accepted_by
            .map(|(source, opaque_id)| Baseline {
                source,
                mission_type: self.mission_type,
                fingerprint: MissionFingerprint::new(self.count(), opaque_id),
            })
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::testing::{finished, from_vehicle, items, sent};
    use missionlink_protocol::MissionRequest;

    fn upload(n: u16) -> UploadExchange {
        UploadExchange::new(Target::system(1), MissionType::Mission, items(n), 2).unwrap()
    }

    fn request(seq: u16) -> Envelope {
        from_vehicle(Message::MissionRequest(MissionRequest {
            seq,
            mission_type: MissionType::Mission,
        }))
    }

    fn ack(result: MissionResultCode) -> Envelope {
        let mut ack = MissionAck::new(result, MissionType::Mission);
        ack.opaque_id = 77;
        from_vehicle(Message::MissionAck(ack))
    }

    #[test]
    fn happy_path() {
        let mut up = upload(3);
        let steps = up.start();
        assert!(matches!(
            sent(&steps).as_slice(),
            [Message::MissionCount(MissionCount { count: 3, .. })]
        ));
        assert_eq!(up.phase(), UploadPhase::SendingCount);

        for seq in 0..3 {
            let steps = up.on_request(seq);
            match sent(&steps).as_slice() {
                [Message::MissionItem(item)] => assert_eq!(item.seq, seq),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(up.phase(), UploadPhase::AwaitingFinalAck);

        let result = finished(up.on_message(&ack(MissionResultCode::Accepted)));
        assert_eq!(result, Some(Ok(())));
        assert_eq!(up.phase(), UploadPhase::Done);

        let baselines = up.baselines();
        assert_eq!(baselines.len(), 1);
        assert_eq!(baselines[0].source, Target::component(1, 1));
        assert_eq!(baselines[0].fingerprint, MissionFingerprint::new(3, 77));
    }

    #[test]
    fn empty_list_completes_on_ack() {
        let mut up = upload(0);
        up.start();
        assert_eq!(
            finished(up.on_message(&ack(MissionResultCode::Accepted))),
            Some(Ok(()))
        );
    }

    #[test]
    fn early_accept_is_a_violation() {
        let mut up = upload(3);
        up.start();
        up.on_request(0);
        let result = finished(up.on_message(&ack(MissionResultCode::Accepted)));
        assert!(matches!(result, Some(Err(EngineError::ProtocolViolation(_)))));
        assert_eq!(up.phase(), UploadPhase::Failed);
        assert!(up.baselines().is_empty());
    }

    #[test]
    fn accept_requires_every_item() {
        let mut up = upload(3);
        up.start();
        // Highest item first; the middle one is never requested.
        up.on_request(0);
        up.on_request(2);
        assert_eq!(up.phase(), UploadPhase::AwaitingFinalAck);
        let result = finished(up.on_message(&ack(MissionResultCode::Accepted)));
        assert!(matches!(result, Some(Err(EngineError::ProtocolViolation(_)))));
    }

    #[test]
    fn items_requested_after_the_last_one_count_as_delivered() {
        let mut up = upload(3);
        up.start();
        for seq in [0, 2, 1] {
            let steps = up.on_message(&request(seq));
            assert!(matches!(
                sent(&steps).as_slice(),
                [Message::MissionItem(item)] if item.seq == seq
            ));
        }
        assert_eq!(up.phase(), UploadPhase::AwaitingFinalAck);

        let result = finished(up.on_message(&ack(MissionResultCode::Accepted)));
        assert_eq!(result, Some(Ok(())));
        assert_eq!(up.phase(), UploadPhase::Done);
    }

    #[test]
    fn out_of_range_request() {
        let mut up = upload(2);
        up.start();
        let result = finished(up.on_message(&request(5)));
        assert!(matches!(result, Some(Err(EngineError::ProtocolViolation(_)))));
    }

    #[test]
    fn out_of_range_after_last_item_is_ignored() {
        let mut up = upload(2);
        up.start();
        up.on_request(0);
        up.on_request(1);
        assert!(up.on_message(&request(9)).is_empty());

        // In-range re-requests are still served.
        assert_eq!(sent(&up.on_message(&request(0))).len(), 1);
        assert_eq!(up.phase(), UploadPhase::AwaitingFinalAck);
    }

    #[test]
    fn repeated_request_resends_item() {
        let mut up = upload(3);
        up.start();
        up.on_request(0);
        let again = sent(&up.on_request(0));
        assert!(matches!(again.as_slice(), [Message::MissionItem(item)] if item.seq == 0));
        assert_eq!(up.phase(), UploadPhase::AwaitingItemRequests);
    }

    #[test]
    fn timeout_resends_last_artifact() {
        let mut up = upload(3);
        up.start();
        assert!(matches!(
            sent(&up.on_timeout()).as_slice(),
            [Message::MissionCount(_)]
        ));

        up.on_request(1);
        assert!(matches!(
            sent(&up.on_timeout()).as_slice(),
            [Message::MissionItem(item)] if item.seq == 1
        ));
        // Progress refilled the budget; two silent periods are tolerated.
        up.on_timeout();
        assert_eq!(finished(up.on_timeout()), Some(Err(EngineError::TimedOut)));
    }

    #[test]
    fn rejection_is_denied() {
        let mut up = upload(3);
        up.start();
        let result = finished(up.on_message(&ack(MissionResultCode::NoSpace)));
        assert_eq!(
            result,
            Some(Err(EngineError::Denied(DenialReason::Mission(
                MissionResultCode::NoSpace
            ))))
        );
    }

    #[test]
    fn cancel_notifies_remote() {
        let mut up = upload(3);
        up.start();
        let steps = up.on_cancel();
        assert!(matches!(
            sent(&steps).as_slice(),
            [Message::MissionAck(MissionAck {
                result: MissionResultCode::OperationCancelled,
                ..
            })]
        ));
        assert_eq!(finished(steps), Some(Err(EngineError::Cancelled)));
    }

    #[test]
    fn other_list_types_are_ignored() {
        let mut up = upload(1);
        up.start();
        let fence = from_vehicle(Message::MissionRequest(MissionRequest {
            seq: 0,
            mission_type: MissionType::Fence,
        }));
        assert!(up.on_message(&fence).is_empty());
    }

    #[test]
    fn invalid_list_is_rejected_up_front() {
        let mut list = items(2);
        list[1].seq = 0;
        assert!(matches!(
            UploadExchange::new(Target::system(1), MissionType::Mission, list, 2),
            Err(EngineError::InvalidRequest(_))
        ));
    }
}
