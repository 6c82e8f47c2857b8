use super::for_list;
use crate::bus::Filter;
use crate::driver::{Exchange, RetryBudget, Step, Steps};
use crate::error::{DenialReason, EngineError};
use crate::notifier::{Baseline, MissionFingerprint};
use missionlink_protocol::{
    Envelope, Message, MessageKind, MissionAck, MissionCount, MissionItem, MissionRequest,
    MissionRequestList, MissionResultCode, MissionType, Target,
};
use tracing::{debug, trace};

/// Progress of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    /// Not started.
    Idle,
    /// Asking for the item count.
    SendingListRequest,
    /// List request sent; waiting for the count.
    AwaitingCount,
    /// Fetching items in order.
    RequestingItems,
    /// Every item received; acknowledging.
    ///
    /// Transient: the final acknowledgement needs no reply, so a download
    /// moves from here to [`DownloadPhase::Done`] in the step that sends it
    /// and this phase is never observed between events.
    AwaitingFinalAck,
    /// List fully received.
    Done,
    /// Terminated with an error.
    Failed,
}

/// Pulls a list from the remote, one item request at a time.
pub(crate) struct DownloadExchange {
    target: Target,
    mission_type: MissionType,
    phase: DownloadPhase,
    budget: RetryBudget,
    expected: u16,
    opaque_id: u32,
    source: Option<Target>,
    items: Vec<MissionItem>,
}

impl DownloadExchange {
    pub(crate) fn new(target: Target, mission_type: MissionType, retries: u32) -> Self {
        Self {
            target,
            mission_type,
            phase: DownloadPhase::Idle,
            budget: RetryBudget::new(retries),
            expected: 0,
            opaque_id: 0,
            source: None,
            items: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> DownloadPhase {
        self.phase
    }

    fn list_request(&self) -> Message {
        Message::MissionRequestList(MissionRequestList {
            mission_type: self.mission_type,
        })
    }

    fn item_request(&self) -> Message {
        Message::MissionRequest(MissionRequest {
            seq: self.next_seq(),
            mission_type: self.mission_type,
        })
    }

    fn next_seq(&self) -> u16 {
        u16::try_from(self.items.len()).unwrap_or(u16::MAX)
    }

    fn final_ack(&self) -> Message {
        Message::MissionAck(MissionAck {
            result: MissionResultCode::Accepted,
            mission_type: self.mission_type,
            opaque_id: self.opaque_id,
        })
    }

    fn fail(&mut self, error: EngineError) -> Steps<Vec<MissionItem>> {
        self.phase = DownloadPhase::Failed;
        vec![Step::Finish(Err(error))]
    }

    fn complete(&mut self) -> Steps<Vec<MissionItem>> {
        let ack = self.final_ack();
        self.phase = DownloadPhase::Done;
        vec![
            Step::Send(ack),
            Step::Finish(Ok(std::mem::take(&mut self.items))),
        ]
    }

    fn on_count(&mut self, source: Target, count: &MissionCount) -> Steps<Vec<MissionItem>> {
        match self.phase {
            DownloadPhase::AwaitingCount => {
                debug!(target = %self.target, count = count.count, "remote announced item count");
                self.source = Some(source);
                self.expected = count.count;
                self.opaque_id = count.opaque_id;
                self.budget.progress();
                if count.count == 0 {
                    return self.complete();
                }
                self.phase = DownloadPhase::RequestingItems;
                vec![Step::Send(self.item_request()), Step::Rearm]
            }
            DownloadPhase::RequestingItems if self.items.is_empty() => {
                if count.count != self.expected {
                    return self.fail(EngineError::violation(format!(
                        "count changed from {} to {} during download",
                        self.expected, count.count
                    )));
                }
                // Our first item request was probably lost.
                vec![Step::Send(self.item_request()), Step::Rearm]
            }
            _ => Vec::new(),
        }
    }

    fn on_item(&mut self, item: &MissionItem) -> Steps<Vec<MissionItem>> {
        if self.phase != DownloadPhase::RequestingItems {
            trace!(target = %self.target, seq = item.seq, "ignoring unsolicited item");
            return Vec::new();
        }

        let expected = self.next_seq();
        if item.seq != expected {
            return self.fail(EngineError::violation(format!(
                "expected item {expected}, received {}",
                item.seq
            )));
        }

        self.items.push(*item);
        self.budget.progress();
        if self.items.len() == usize::from(self.expected) {
            return self.complete();
        }
        vec![Step::Send(self.item_request()), Step::Rearm]
    }
}

impl Exchange for DownloadExchange {
    type Output = Vec<MissionItem>;

    const NAME: &'static str = "mission download";

    fn interests(&self) -> Vec<(MessageKind, Filter)> {
        vec![
            (MessageKind::MissionCount, for_list(self.mission_type)),
            (MessageKind::MissionItem, for_list(self.mission_type)),
            (MessageKind::MissionAck, for_list(self.mission_type)),
        ]
    }

    fn start(&mut self) -> Steps<Vec<MissionItem>> {
        debug!(target = %self.target, mission_type = %self.mission_type, "requesting mission list");
        self.phase = DownloadPhase::SendingListRequest;
        self.budget.progress();
        let steps = vec![Step::Send(self.list_request()), Step::Rearm];
        self.phase = DownloadPhase::AwaitingCount;
        steps
    }

    fn on_message(&mut self, envelope: &Envelope) -> Steps<Vec<MissionItem>> {
        match &envelope.message {
            Message::MissionCount(count) if count.mission_type == self.mission_type => {
                self.on_count(envelope.source, count)
            }
            Message::MissionItem(item) if item.mission_type == self.mission_type => {
                self.on_item(item)
            }
            Message::MissionAck(ack)
                if ack.mission_type == self.mission_type
                    && ack.result != MissionResultCode::Accepted =>
            {
                self.fail(EngineError::Denied(DenialReason::Mission(ack.result)))
            }
            _ => Vec::new(),
        }
    }

    fn on_timeout(&mut self) -> Steps<Vec<MissionItem>> {
        if !self.budget.consume() {
            return self.fail(EngineError::TimedOut);
        }
        let message = match self.phase {
            DownloadPhase::AwaitingCount => self.list_request(),
            _ => self.item_request(),
        };
        debug!(target = %self.target, phase = ?self.phase, "no response, resending request");
        vec![Step::Send(message), Step::Rearm]
    }

    fn on_cancel(&mut self) -> Steps<Vec<MissionItem>> {
        self.phase = DownloadPhase::Failed;
        vec![
            Step::Notify(Message::MissionAck(MissionAck::new(
                MissionResultCode::OperationCancelled,
                self.mission_type,
            ))),
            Step::Finish(Err(EngineError::Cancelled)),
        ]
    }

    fn baselines(&self) -> Vec<Baseline> {
        self.source
            .map(|source| Baseline {
                source,
                mission_type: self.mission_type,
                fingerprint: MissionFingerprint::new(self.expected, self.opaque_id),
            })
            .into_iter()
            .collect()
    }
}
