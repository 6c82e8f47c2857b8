//! The protocol message family.

use crate::command::{CommandAck, CommandLong};
use crate::mission::{
    MissionAck, MissionClearAll, MissionCount, MissionItem, MissionRequest, MissionRequestList,
    MissionStatus, MissionType,
};
use crate::target::Target;
use serde::{Deserialize, Serialize};

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Command request.
    CommandLong(CommandLong),
    /// Command acknowledgement.
    CommandAck(CommandAck),
    /// List item count.
    MissionCount(MissionCount),
    /// Request for a list's item count.
    MissionRequestList(MissionRequestList),
    /// Request for one item.
    MissionRequest(MissionRequest),
    /// One list item.
    MissionItem(MissionItem),
    /// Final acknowledgement of a transfer.
    MissionAck(MissionAck),
    /// Request to delete a list.
    MissionClearAll(MissionClearAll),
    /// Unsolicited list status.
    MissionStatus(MissionStatus),
}

/// Discriminant of a [`Message`], used to register interest on a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// [`Message::CommandLong`].
    CommandLong,
    /// [`Message::CommandAck`].
    CommandAck,
    /// [`Message::MissionCount`].
    MissionCount,
    /// [`Message::MissionRequestList`].
    MissionRequestList,
    /// [`Message::MissionRequest`].
    MissionRequest,
    /// [`Message::MissionItem`].
    MissionItem,
    /// [`Message::MissionAck`].
    MissionAck,
    /// [`Message::MissionClearAll`].
    MissionClearAll,
    /// [`Message::MissionStatus`].
    MissionStatus,
}

impl Message {
    /// Returns the message kind.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::CommandLong(_) => MessageKind::CommandLong,
            Message::CommandAck(_) => MessageKind::CommandAck,
            Message::MissionCount(_) => MessageKind::MissionCount,
            Message::MissionRequestList(_) => MessageKind::MissionRequestList,
            Message::MissionRequest(_) => MessageKind::MissionRequest,
            Message::MissionItem(_) => MessageKind::MissionItem,
            Message::MissionAck(_) => MessageKind::MissionAck,
            Message::MissionClearAll(_) => MessageKind::MissionClearAll,
            Message::MissionStatus(_) => MessageKind::MissionStatus,
        }
    }

    /// Returns the list a mission message refers to, if any.
    pub fn mission_type(&self) -> Option<MissionType> {
        match self {
            Message::MissionCount(m) => Some(m.mission_type),
            Message::MissionRequestList(m) => Some(m.mission_type),
            Message::MissionRequest(m) => Some(m.mission_type),
            Message::MissionItem(m) => Some(m.mission_type),
            Message::MissionAck(m) => Some(m.mission_type),
            Message::MissionClearAll(m) => Some(m.mission_type),
            Message::MissionStatus(m) => Some(m.mission_type),
            Message::CommandLong(_) | Message::CommandAck(_) => None,
        }
    }
}

/// An inbound message tagged with the peer it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Sender identity.
    pub source: Target,
    /// Message body.
    pub message: Message,
}

impl Envelope {
    /// Creates an envelope.
    pub fn new(source: Target, message: Message) -> Self {
        Self { source, message }
    }

    /// Returns the message kind.
    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }
}
