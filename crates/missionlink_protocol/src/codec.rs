//! CBOR frame codec.
//!
//! Transports carry one [`Frame`] per datagram. The codec is stateless.
//! Checksums belong to the link and retransmission to the engine.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Envelope, Message};
use crate::target::Target;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One addressed message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Sender identity.
    pub source: Target,
    /// Intended receiver.
    pub destination: Target,
    /// Message body.
    pub message: Message,
}

impl Frame {
    /// Creates a frame.
    pub fn new(source: Target, destination: Target, message: Message) -> Self {
        Self {
            source,
            destination,
            message,
        }
    }

    /// Converts the frame into an inbound envelope, dropping the destination.
    pub fn into_envelope(self) -> Envelope {
        Envelope::new(self.source, self.message)
    }
}

/// Encodes a frame to CBOR bytes.
pub fn encode_frame(frame: &Frame) -> ProtocolResult<Bytes> {
    let mut buf = Vec::with_capacity(64);
    ciborium::ser::into_writer(frame, &mut buf)
        .map_err(|e| ProtocolError::encode(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Decodes a frame from CBOR bytes.
pub fn decode_frame(bytes: &[u8]) -> ProtocolResult<Frame> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::decode(e.to_string()))
}
