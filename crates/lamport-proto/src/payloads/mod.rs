//! Typed payloads for each message type.
//!
//! Control messages (STOP, ACK and the three critical-section messages)
//! carry no body. STARTED and DONE carry the log line the sender wrote for
//! the event, so a receiver can log exactly what the sender logged.
//! TRANSFER and BALANCE_HISTORY have fixed binary layouts defined in their
//! own modules.

pub mod history;
pub mod transfer;

use bytes::Bytes;

pub use history::{BalanceHistory, BalanceState};
pub use transfer::TransferOrder;

use crate::{
    errors::{ProtocolError, Result},
    header::MAX_PAYLOAD_LEN,
    message_type::MessageType,
};

/// Decoded message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// STARTED with the sender's log line.
    Started(String),
    /// DONE with the sender's log line.
    Done(String),
    /// Transfer acknowledgment.
    Ack,
    /// End of the transfer phase.
    Stop,
    /// Transfer order.
    Transfer(TransferOrder),
    /// Balance timeline of one worker.
    BalanceHistory(BalanceHistory),
    /// Critical-section request.
    CsRequest,
    /// Critical-section permission.
    CsReply,
    /// Critical-section release.
    CsRelease,
}

impl Payload {
    /// Message type this payload travels under.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Started(_) => MessageType::Started,
            Self::Done(_) => MessageType::Done,
            Self::Ack => MessageType::Ack,
            Self::Stop => MessageType::Stop,
            Self::Transfer(_) => MessageType::Transfer,
            Self::BalanceHistory(_) => MessageType::BalanceHistory,
            Self::CsRequest => MessageType::CsRequest,
            Self::CsReply => MessageType::CsReply,
            Self::CsRelease => MessageType::CsRelease,
        }
    }

    /// Serialize the body.
    pub fn encode(&self) -> Result<Bytes> {
        let bytes = match self {
            Self::Started(text) | Self::Done(text) => Bytes::copy_from_slice(text.as_bytes()),
            Self::Transfer(order) => order.encode(),
            Self::BalanceHistory(history) => history.encode()?,
            Self::Ack | Self::Stop | Self::CsRequest | Self::CsReply | Self::CsRelease => {
                Bytes::new()
            },
        };

        if bytes.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge { size: bytes.len(), max: MAX_PAYLOAD_LEN });
        }
        Ok(bytes)
    }

    /// Parse a body received under `kind`.
    pub fn decode(kind: MessageType, bytes: &[u8]) -> Result<Self> {
        match kind {
            MessageType::Started => Ok(Self::Started(decode_text(bytes)?)),
            MessageType::Done => Ok(Self::Done(decode_text(bytes)?)),
            MessageType::Transfer => Ok(Self::Transfer(TransferOrder::decode(bytes)?)),
            MessageType::BalanceHistory => {
                Ok(Self::BalanceHistory(BalanceHistory::decode(bytes)?))
            },
            MessageType::Ack => expect_empty(kind, bytes).map(|()| Self::Ack),
            MessageType::Stop => expect_empty(kind, bytes).map(|()| Self::Stop),
            MessageType::CsRequest => expect_empty(kind, bytes).map(|()| Self::CsRequest),
            MessageType::CsReply => expect_empty(kind, bytes).map(|()| Self::CsReply),
            MessageType::CsRelease => expect_empty(kind, bytes).map(|()| Self::CsRelease),
        }
    }
}

fn decode_text(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes).map(str::to_owned).map_err(|_| ProtocolError::InvalidText)
}

fn expect_empty(kind: MessageType, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::MalformedPayload {
            kind: kind.name(),
            reason: format!("expected empty body, got {} bytes", bytes.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_payloads_are_empty() {
        for payload in [Payload::Ack, Payload::Stop, Payload::CsRequest, Payload::CsReply] {
            assert!(payload.encode().unwrap().is_empty());
        }
    }

    #[test]
    fn control_payload_with_body_rejected() {
        let result = Payload::decode(MessageType::CsReply, &[1]);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload { kind: "CS_REPLY", .. })));
    }

    #[test]
    fn started_text_preserved() {
        let line = "1: process 1 has STARTED with balance $10\n";
        let payload = Payload::Started(line.to_string());
        let bytes = payload.encode().unwrap();

        assert_eq!(&bytes[..], line.as_bytes());
        assert_eq!(Payload::decode(MessageType::Started, &bytes).unwrap(), payload);
    }

    #[test]
    fn invalid_utf8_rejected() {
        assert_eq!(Payload::decode(MessageType::Done, &[0xFF, 0xFE]), Err(ProtocolError::InvalidText));
    }

    #[test]
    fn oversized_text_rejected() {
        let payload = Payload::Done("x".repeat(MAX_PAYLOAD_LEN + 1));
        assert!(matches!(payload.encode(), Err(ProtocolError::PayloadTooLarge { .. })));
    }
}
