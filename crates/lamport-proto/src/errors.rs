//! Wire-level error types.

use thiserror::Error;

/// Result alias for wire operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding frames.
///
/// All of these are fatal to the receiving process: the channel carries a
/// single ordered byte stream, so once a frame cannot be trusted nothing
/// after it can be either.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Header magic did not match [`crate::FrameHeader::MAGIC`].
    #[error("invalid magic: expected {expected:#010x}, got {got:#010x}")]
    InvalidMagic {
        /// Sentinel we require.
        expected: u32,
        /// Sentinel found on the wire.
        got: u32,
    },

    /// Payload exceeds the per-frame ceiling.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Requested payload size.
        size: usize,
        /// Maximum payload size.
        max: usize,
    },

    /// Buffer ended before the frame did.
    #[error("frame truncated: expected {expected} bytes, got {got}")]
    Truncated {
        /// Bytes needed.
        expected: usize,
        /// Bytes available.
        got: usize,
    },

    /// Message type byte is outside the closed set.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    /// Payload shape does not match its message type.
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload {
        /// Message type whose payload failed to decode.
        kind: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// Text payload was not UTF-8.
    #[error("text payload is not valid UTF-8")]
    InvalidText,
}
