//! Complete frames: header plus payload bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    Timestamp,
    errors::{ProtocolError, Result},
    header::FrameHeader,
    message_type::MessageType,
    payloads::Payload,
};

/// One framed message.
///
/// The payload is kept as raw bytes so a message can be forwarded or
/// multicast without re-encoding; [`Message::payload`] decodes on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Validated header.
    pub header: FrameHeader,
    /// Exactly `header.payload_size()` bytes.
    pub payload: Bytes,
}

impl Message {
    /// Encode `payload` into a message stamped with `timestamp`.
    pub fn new(payload: &Payload, timestamp: Timestamp) -> Result<Self> {
        let bytes = payload.encode()?;
        let header = FrameHeader::new(payload.message_type(), bytes.len(), timestamp)?;
        Ok(Self { header, payload: bytes })
    }

    /// Pair a header read off the wire with its body.
    pub fn from_parts(header: FrameHeader, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() != header.payload_size() {
            return Err(ProtocolError::Truncated {
                expected: header.payload_size(),
                got: payload.len(),
            });
        }
        Ok(Self { header, payload })
    }

    /// Message type from the header.
    pub fn message_type(&self) -> Result<MessageType> {
        self.header.message_type()
    }

    /// Sender's Lamport timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.header.timestamp()
    }

    /// Decode the body according to the header type.
    pub fn payload(&self) -> Result<Payload> {
        Payload::decode(self.message_type()?, &self.payload)
    }

    /// Total encoded size, header included.
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Append the wire representation to `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);
    }

    /// Wire representation as one contiguous buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode one frame from the front of `bytes`.
    ///
    /// Returns the message and the number of bytes it occupied.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let header = *FrameHeader::from_bytes(bytes)?;
        let total = FrameHeader::SIZE + header.payload_size();

        let body = bytes
            .get(FrameHeader::SIZE..total)
            .ok_or(ProtocolError::Truncated { expected: total, got: bytes.len() })?;

        Ok((Self { header, payload: Bytes::copy_from_slice(body) }, total))
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;
    use crate::payloads::TransferOrder;

    #[test]
    fn transfer_frame_bytes() {
        let order = TransferOrder { src: 1, dst: 2, amount: 5 };
        let message = Message::new(&Payload::Transfer(order), 3).unwrap();

        assert_eq!(message.encoded_len(), 13);
        assert_eq!(&message.to_bytes()[..], &hex!("afafafaf 0400 04 0300 01 02 0500"));
    }

    #[test]
    fn decode_reports_consumed_length() {
        let first = Message::new(&Payload::CsRequest, 7).unwrap();
        let second = Message::new(&Payload::Done("bye".into()), 8).unwrap();

        let mut buf = BytesMut::new();
        first.encode(&mut buf);
        second.encode(&mut buf);

        let (decoded, used) = Message::decode(&buf).unwrap();
        assert_eq!(decoded, first);
        assert_eq!(used, FrameHeader::SIZE);

        let (decoded, _) = Message::decode(&buf[used..]).unwrap();
        assert_eq!(decoded.payload().unwrap(), Payload::Done("bye".into()));
        assert_eq!(decoded.timestamp(), 8);
    }

    #[test]
    fn truncated_body_rejected() {
        let message = Message::new(&Payload::Started("hello".into()), 1).unwrap();
        let bytes = message.to_bytes();

        assert_eq!(
            Message::decode(&bytes[..bytes.len() - 1]),
            Err(ProtocolError::Truncated { expected: 14, got: 13 })
        );
    }

    #[test]
    fn from_parts_checks_length() {
        let header = FrameHeader::new(MessageType::Started, 3, 0).unwrap();
        assert!(Message::from_parts(header, vec![1, 2]).is_err());
        assert!(Message::from_parts(header, vec![b'a', b'b', b'c']).is_ok());
    }

    proptest! {
        #[test]
        fn decode_arbitrary_bytes_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            if let Ok((message, used)) = Message::decode(&bytes) {
                prop_assert_eq!(used, message.encoded_len());
                prop_assert_eq!(&message.to_bytes()[..], &bytes[..used]);
            }
        }
    }
}
