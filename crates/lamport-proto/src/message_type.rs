//! Message type discriminants.

use std::fmt;

use crate::errors::{ProtocolError, Result};

/// Closed set of message types carried in the header `type` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MessageType {
    /// Process finished startup; payload is its STARTED log line.
    Started = 0,
    /// Process finished its work; payload is its DONE log line.
    Done = 1,
    /// Destination acknowledges a completed transfer to the coordinator.
    Ack = 2,
    /// Coordinator ends the transfer phase.
    Stop = 3,
    /// Transfer order `{src, dst, amount}`.
    Transfer = 4,
    /// Worker balance timeline sent to the coordinator at shutdown.
    BalanceHistory = 5,
    /// Request for the critical section.
    CsRequest = 6,
    /// Permission for a peer's critical-section request.
    CsReply = 7,
    /// Critical section released.
    CsRelease = 8,
}

impl MessageType {
    /// Every message type, in discriminant order.
    pub const ALL: [Self; 9] = [
        Self::Started,
        Self::Done,
        Self::Ack,
        Self::Stop,
        Self::Transfer,
        Self::BalanceHistory,
        Self::CsRequest,
        Self::CsReply,
        Self::CsRelease,
    ];

    /// Wire representation.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse the wire representation.
    pub fn from_u8(value: u8) -> Result<Self> {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(ProtocolError::UnknownMessageType(value))
    }

    /// Upper-case name as used in protocol descriptions and logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Done => "DONE",
            Self::Ack => "ACK",
            Self::Stop => "STOP",
            Self::Transfer => "TRANSFER",
            Self::BalanceHistory => "BALANCE_HISTORY",
            Self::CsRequest => "CS_REQUEST",
            Self::CsReply => "CS_REPLY",
            Self::CsRelease => "CS_RELEASE",
        }
    }

    /// Whether this type belongs to the mutual-exclusion protocol.
    pub const fn is_critical_section(self) -> bool {
        matches!(self, Self::CsRequest | Self::CsReply | Self::CsRelease)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        Self::from_u8(value)
    }
}
