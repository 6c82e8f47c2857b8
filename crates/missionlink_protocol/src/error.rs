//! Error types for protocol operations.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while building or coding protocol messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A command carries at most seven numeric parameters.
    #[error("too many command parameters: {0} (maximum is 7)")]
    TooManyParams(usize),

    /// Frame could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// Frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ProtocolError {
    /// Creates an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}
