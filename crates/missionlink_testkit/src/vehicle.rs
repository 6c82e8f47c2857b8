//! Simulated autopilot.
//!
//! [`SimVehicle`] answers commands and serves the mission protocol the way
//! a flight controller does: it requests uploaded items one at a time,
//! serves downloads on request, and broadcasts a status describing each
//! stored list. Faults can be injected to exercise error paths.

use missionlink_protocol::{
    CommandAck, CommandCode, CommandLong, CommandResultCode, Message, MissionAck, MissionCount,
    MissionItem, MissionRequest, MissionResultCode, MissionStatus, MissionType, Target,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, trace};

/// How the vehicle answers one command code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandBehavior {
    /// Reply with each result, in order, every time the command arrives.
    Reply(Vec<CommandResultCode>),
    /// Never reply.
    Silent,
}

impl CommandBehavior {
    /// Replies with a single result.
    pub fn result(result: CommandResultCode) -> Self {
        Self::Reply(vec![result])
    }
}

#[derive(Debug, Clone, Default)]
struct StoredList {
    items: Vec<MissionItem>,
    opaque_id: u32,
}

#[derive(Debug)]
struct UploadInProgress {
    mission_type: MissionType,
    expected: u16,
    items: Vec<MissionItem>,
}

#[derive(Debug, Default)]
struct Faults {
    /// Serve this download position with the following item instead.
    skip_item: Option<u16>,
    /// Answer the next upload count with this result.
    reject_upload: Option<MissionResultCode>,
    /// Accept an upload as soon as the count arrives.
    accept_early: bool,
}

#[derive(Debug, Default)]
struct VehicleState {
    lists: HashMap<MissionType, StoredList>,
    upload: Option<UploadInProgress>,
    last_upload_ack: Option<MissionAck>,
    behaviors: HashMap<CommandCode, CommandBehavior>,
    commands: Vec<CommandLong>,
    armed: bool,
    next_opaque: u32,
    faults: Faults,
}

/// Autopilot emulation for tests and demos.
#[derive(Debug)]
pub struct SimVehicle {
    identity: Target,
    track_opaque_ids: bool,
    state: Mutex<VehicleState>,
}

impl SimVehicle {
    /// Creates a vehicle answering as `identity`.
    pub fn new(identity: Target) -> Self {
        Self {
            identity,
            track_opaque_ids: true,
            state: Mutex::new(VehicleState {
                next_opaque: 1,
                ..VehicleState::default()
            }),
        }
    }

    /// Reports 0 as the identity of every stored list.
    pub fn without_opaque_ids(mut self) -> Self {
        self.track_opaque_ids = false;
        self
    }

    /// Identity used as the source of every reply.
    pub fn identity(&self) -> Target {
        self.identity
    }

    /// Sets how the vehicle answers `code`.
    pub fn set_command_behavior(&self, code: CommandCode, behavior: CommandBehavior) {
        self.state.lock().behaviors.insert(code, behavior);
    }

    /// Every command received so far, including resends.
    pub fn received_commands(&self) -> Vec<CommandLong> {
        self.state.lock().commands.clone()
    }

    /// Whether an arm command has been accepted.
    pub fn is_armed(&self) -> bool {
        self.state.lock().armed
    }

    /// The stored list of `mission_type`.
    pub fn mission(&self, mission_type: MissionType) -> Vec<MissionItem> {
        self.state
            .lock()
            .lists
            .get(&mission_type)
            .map(|list| list.items.clone())
            .unwrap_or_default()
    }

    /// Replaces a stored list as another client would.
    pub fn replace_mission(&self, mission_type: MissionType, items: Vec<MissionItem>) {
        let mut state = self.state.lock();
        let opaque_id = self.next_opaque(&mut state);
        state
            .lists
            .insert(mission_type, StoredList { items, opaque_id });
    }

    /// Status broadcast for `mission_type`.
    pub fn status(&self, mission_type: MissionType) -> Message {
        let state = self.state.lock();
        let list = state.lists.get(&mission_type);
        Message::MissionStatus(MissionStatus {
            current_seq: 0,
            total: list.map_or(0, |list| count_of(&list.items)),
            mission_type,
            opaque_id: list.map_or(0, |list| list.opaque_id),
        })
    }

    /// Serves the item after `seq` when `seq` is next requested.
    pub fn inject_out_of_sequence(&self, seq: u16) {
        self.state.lock().faults.skip_item = Some(seq);
    }

    /// Rejects the next upload with `result`.
    pub fn reject_next_upload(&self, result: MissionResultCode) {
        self.state.lock().faults.reject_upload = Some(result);
    }

    /// Accepts the next upload without requesting any item.
    pub fn accept_next_upload_early(&self) {
        self.state.lock().faults.accept_early = true;
    }

    /// Handles one message from the ground and returns the replies.
    pub fn handle(&self, message: &Message) -> Vec<Message> {
        let mut state = self.state.lock();
        match message {
            Message::CommandLong(command) => self.on_command(&mut state, command),
            Message::MissionCount(count) => self.on_count(&mut state, count),
            Message::MissionItem(item) => self.on_item(&mut state, item),
            Message::MissionRequestList(request) => {
                let list = state.lists.get(&request.mission_type);
                vec![Message::MissionCount(MissionCount {
                    count: list.map_or(0, |list| count_of(&list.items)),
                    mission_type: request.mission_type,
                    opaque_id: list.map_or(0, |list| list.opaque_id),
                })]
            }
            Message::MissionRequest(request) => self.on_request(&mut state, request),
            Message::MissionClearAll(clear) => {
                let opaque_id = self.next_opaque(&mut state);
                match clear.mission_type {
                    MissionType::All => state.lists.clear(),
                    other => {
                        state.lists.remove(&other);
                    }
                }
                debug!(mission_type = %clear.mission_type, "vehicle cleared list");
                vec![Message::MissionAck(MissionAck {
                    result: MissionResultCode::Accepted,
                    mission_type: clear.mission_type,
                    opaque_id,
                })]
            }
            Message::MissionAck(ack) => {
                if ack.result == MissionResultCode::OperationCancelled {
                    debug!("ground cancelled the transfer");
                    state.upload = None;
                }
                Vec::new()
            }
            Message::CommandAck(_) | Message::MissionStatus(_) => Vec::new(),
        }
    }

    fn next_opaque(&self, state: &mut VehicleState) -> u32 {
        if !self.track_opaque_ids {
            return 0;
        }
        let id = state.next_opaque;
        state.next_opaque = state.next_opaque.wrapping_add(1).max(1);
        id
    }

    fn on_command(&self, state: &mut VehicleState, command: &CommandLong) -> Vec<Message> {
        state.commands.push(*command);
        let behavior = state
            .behaviors
            .get(&command.command)
            .cloned()
            .unwrap_or_else(|| CommandBehavior::result(CommandResultCode::Accepted));

        let results = match behavior {
            CommandBehavior::Silent => return Vec::new(),
            CommandBehavior::Reply(results) => results,
        };
        if command.command == CommandCode::ARM_DISARM
            && results.last() == Some(&CommandResultCode::Accepted)
        {
            state.armed = command.params.get(1) == Some(1.0);
        }
        results
            .into_iter()
            .map(|result| Message::CommandAck(CommandAck::new(command.command, result)))
            .collect()
    }

    fn on_count(&self, state: &mut VehicleState, count: &MissionCount) -> Vec<Message> {
        if let Some(result) = state.faults.reject_upload.take() {
            return vec![Message::MissionAck(MissionAck::new(result, count.mission_type))];
        }
        if std::mem::take(&mut state.faults.accept_early) && count.count > 0 {
            return vec![Message::MissionAck(MissionAck::new(
                MissionResultCode::Accepted,
                count.mission_type,
            ))];
        }

        state.last_upload_ack = None;
        if count.count == 0 {
            return vec![Message::MissionAck(self.store(
                state,
                count.mission_type,
                Vec::new(),
            ))];
        }

        // A repeated count restarts the transfer.
        state.upload = Some(UploadInProgress {
            mission_type: count.mission_type,
            expected: count.count,
            items: Vec::with_capacity(usize::from(count.count)),
        });
        vec![request(0, count.mission_type)]
    }

    fn on_item(&self, state: &mut VehicleState, item: &MissionItem) -> Vec<Message> {
        let Some(upload) = state.upload.as_mut() else {
            // Our final ack was lost and the ground resent its last item.
            return state
                .last_upload_ack
                .map(Message::MissionAck)
                .into_iter()
                .collect();
        };

        let next = count_of(&upload.items);
        if item.seq != next || item.mission_type != upload.mission_type {
            trace!(expected = next, received = item.seq, "re-requesting item");
            return vec![request(next, upload.mission_type)];
        }

        upload.items.push(*item);
        if upload.items.len() < usize::from(upload.expected) {
            return vec![request(next + 1, upload.mission_type)];
        }

        let Some(done) = state.upload.take() else {
            return Vec::new();
        };
        let ack = self.store(state, done.mission_type, done.items);
        state.last_upload_ack = Some(ack);
        vec![Message::MissionAck(ack)]
    }

    fn on_request(&self, state: &mut VehicleState, req: &MissionRequest) -> Vec<Message> {
        let items = state
            .lists
            .get(&req.mission_type)
            .map(|list| list.items.as_slice())
            .unwrap_or_default();

        let mut seq = req.seq;
        if state.faults.skip_item == Some(seq) {
            debug!(seq, "serving item out of sequence");
            seq += 1;
        }
        match items.get(usize::from(seq)) {
            Some(item) => {
                let item = *item;
                if seq != req.seq {
                    state.faults.skip_item = None;
                }
                vec![Message::MissionItem(item)]
            }
            None => vec![Message::MissionAck(MissionAck::new(
                MissionResultCode::InvalidSequence,
                req.mission_type,
            ))],
        }
    }

    fn store(
        &self,
        state: &mut VehicleState,
        mission_type: MissionType,
        items: Vec<MissionItem>,
    ) -> MissionAck {
        let opaque_id = self.next_opaque(state);
        debug!(%mission_type, count = items.len(), "vehicle stored list");
        state
            .lists
            .insert(mission_type, StoredList { items, opaque_id });
        MissionAck {
            result: MissionResultCode::Accepted,
            mission_type,
            opaque_id,
        }
    }
}

fn count_of(items: &[MissionItem]) -> u16 {
    u16::try_from(items.len()).unwrap_or(u16::MAX)
}

fn request(seq: u16, mission_type: MissionType) -> Message {
    Message::MissionRequest(MissionRequest { seq, mission_type })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::waypoints;
    use missionlink_protocol::{CommandParams, MissionClearAll, MissionRequestList};

    fn vehicle() -> SimVehicle {
        SimVehicle::new(Target::component(1, 1))
    }

    fn upload(vehicle: &SimVehicle, items: &[MissionItem]) -> Vec<Message> {
        let mut replies = vehicle.handle(&Message::MissionCount(MissionCount {
            count: count_of(items),
            mission_type: MissionType::Mission,
            opaque_id: 0,
        }));
        while let Some(Message::MissionRequest(req)) = replies.first().cloned() {
            replies = vehicle.handle(&Message::MissionItem(items[usize::from(req.seq)]));
        }
        replies
    }

    #[test]
    fn accepts_an_upload() {
        let vehicle = vehicle();
        let items = waypoints(3);
        let replies = upload(&vehicle, &items);
        assert!(matches!(
            replies.as_slice(),
            [Message::MissionAck(MissionAck {
                result: MissionResultCode::Accepted,
                opaque_id: 1,
                ..
            })]
        ));
        assert_eq!(vehicle.mission(MissionType::Mission), items);
        assert!(matches!(
            vehicle.status(MissionType::Mission),
            Message::MissionStatus(MissionStatus { total: 3, opaque_id: 1, .. })
        ));
    }

    #[test]
    fn resends_final_ack_for_repeated_last_item() {
        let vehicle = vehicle();
        let items = waypoints(2);
        upload(&vehicle, &items);
        let replies = vehicle.handle(&Message::MissionItem(items[1]));
        assert!(matches!(replies.as_slice(), [Message::MissionAck(_)]));
    }

    #[test]
    fn serves_a_download() {
        let vehicle = vehicle();
        vehicle.replace_mission(MissionType::Mission, waypoints(2));

        let replies = vehicle.handle(&Message::MissionRequestList(MissionRequestList {
            mission_type: MissionType::Mission,
        }));
        assert!(matches!(
            replies.as_slice(),
            [Message::MissionCount(MissionCount { count: 2, .. })]
        ));

        let replies = vehicle.handle(&request(1, MissionType::Mission));
        assert!(matches!(replies.as_slice(), [Message::MissionItem(item)] if item.seq == 1));
    }

    #[test]
    fn out_of_sequence_fault_fires_once() {
        let vehicle = vehicle();
        vehicle.replace_mission(MissionType::Mission, waypoints(3));
        vehicle.inject_out_of_sequence(1);

        let replies = vehicle.handle(&request(1, MissionType::Mission));
        assert!(matches!(replies.as_slice(), [Message::MissionItem(item)] if item.seq == 2));
        let replies = vehicle.handle(&request(1, MissionType::Mission));
        assert!(matches!(replies.as_slice(), [Message::MissionItem(item)] if item.seq == 1));
    }

    #[test]
    fn commands_follow_behavior() {
        let vehicle = vehicle();
        let arm = Message::CommandLong(CommandLong {
            command: CommandCode::ARM_DISARM,
            params: CommandParams::from_slice(&[1.0]).unwrap(),
            transaction: 1,
        });

        assert_eq!(vehicle.handle(&arm).len(), 1);
        assert!(vehicle.is_armed());

        vehicle.set_command_behavior(CommandCode::ARM_DISARM, CommandBehavior::Silent);
        assert!(vehicle.handle(&arm).is_empty());
        assert_eq!(vehicle.received_commands().len(), 2);
    }

    #[test]
    fn clear_all_empties_every_list() {
        let vehicle = vehicle();
        vehicle.replace_mission(MissionType::Mission, waypoints(2));
        vehicle.replace_mission(MissionType::Rally, waypoints(1));

        let replies = vehicle.handle(&Message::MissionClearAll(MissionClearAll {
            mission_type: MissionType::All,
        }));
        assert_eq!(replies.len(), 1);
        assert!(vehicle.mission(MissionType::Mission).is_empty());
        assert!(vehicle.mission(MissionType::Rally).is_empty());
    }

    #[test]
    fn rejection_fault() {
        let vehicle = vehicle();
        vehicle.reject_next_upload(MissionResultCode::NoSpace);
        let replies = upload(&vehicle, &waypoints(2));
        assert!(matches!(
            replies.as_slice(),
            [Message::MissionAck(MissionAck {
                result: MissionResultCode::NoSpace,
                ..
            })]
        ));
    }
}
