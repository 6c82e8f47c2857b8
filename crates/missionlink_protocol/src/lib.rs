//! # missionlink protocol
//!
//! Message types and codecs for the missionlink vehicle-control protocol.
//!
//! This crate provides:
//! - `Target` identities for addressing one remote peer
//! - Command request/acknowledgement messages and result codes
//! - Mission list messages (count, request, item, ack, clear, status)
//! - A CBOR frame codec for transports
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod command;
mod error;
mod message;
mod mission;
mod target;

pub use codec::{decode_frame, encode_frame, Frame};
pub use command::{CommandAck, CommandCode, CommandLong, CommandParams, CommandResultCode};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{Envelope, Message, MessageKind};
pub use mission::{
    MissionAck, MissionClearAll, MissionCount, MissionFrame, MissionItem, MissionRequest,
    MissionRequestList, MissionResultCode, MissionStatus, MissionType,
};
pub use target::Target;
