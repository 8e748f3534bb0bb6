//! Fixed-size frame header.

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::little_endian::{I16, U16, U32},
};

use crate::{
    Timestamp,
    errors::{ProtocolError, Result},
    message_type::MessageType,
};

/// Largest frame, header included, that fits the 64 KiB message ceiling.
pub const MAX_MESSAGE_LEN: usize = u16::MAX as usize;

/// Largest payload a single frame may carry.
pub const MAX_PAYLOAD_LEN: usize = MAX_MESSAGE_LEN - FrameHeader::SIZE;

/// Frame header, little-endian on the wire.
///
/// Layout is checked at compile time by `zerocopy`; every field is
/// unaligned so the struct has no padding and `SIZE` is the sum of the
/// field widths.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
#[repr(C)]
pub struct FrameHeader {
    magic: U32,
    payload_len: U16,
    message_type: u8,
    timestamp: I16,
}

const _: () = assert!(size_of::<FrameHeader>() == FrameHeader::SIZE);

impl FrameHeader {
    /// Encoded header size in bytes.
    pub const SIZE: usize = 9;

    /// Sentinel written at the start of every frame.
    pub const MAGIC: u32 = 0xAFAF_AFAF;

    /// Build a header for a payload of `payload_len` bytes.
    pub fn new(kind: MessageType, payload_len: usize, timestamp: Timestamp) -> Result<Self> {
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge { size: payload_len, max: MAX_PAYLOAD_LEN });
        }

        Ok(Self {
            magic: U32::new(Self::MAGIC),
            payload_len: U16::new(payload_len as u16),
            message_type: kind.to_u8(),
            timestamp: I16::new(timestamp),
        })
    }

    /// Borrow and validate a header from the front of `bytes`.
    ///
    /// Checks, in order: length, magic, payload bound, message type. Magic
    /// comes first because on a desynchronized stream the other fields are
    /// noise.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let (header, _rest) = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::Truncated { expected: Self::SIZE, got: bytes.len() })?;

        header.validate()?;
        Ok(header)
    }

    /// Copy the header into its wire representation.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    fn validate(&self) -> Result<()> {
        let magic = self.magic.get();
        if magic != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic { expected: Self::MAGIC, got: magic });
        }

        let size = self.payload_size();
        if size > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge { size, max: MAX_PAYLOAD_LEN });
        }

        MessageType::from_u8(self.message_type)?;
        Ok(())
    }

    /// Magic sentinel as found on the wire.
    pub fn magic(&self) -> u32 {
        self.magic.get()
    }

    /// Number of payload bytes following the header.
    pub fn payload_size(&self) -> usize {
        usize::from(self.payload_len.get())
    }

    /// Raw message type byte.
    pub fn raw_type(&self) -> u8 {
        self.message_type
    }

    /// Decoded message type.
    pub fn message_type(&self) -> Result<MessageType> {
        MessageType::from_u8(self.message_type)
    }

    /// Sender's Lamport timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp.get()
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn wire_layout_is_little_endian() {
        let header = FrameHeader::new(MessageType::Transfer, 4, 0x0102).unwrap();
        assert_eq!(header.to_bytes(), hex!("afafafaf 0400 04 0201"));
    }

    #[test]
    fn parse_valid_header() {
        let bytes = hex!("afafafaf 1000 06 ffff 00");
        let header = FrameHeader::from_bytes(&bytes).unwrap();

        assert_eq!(header.magic(), FrameHeader::MAGIC);
        assert_eq!(header.payload_size(), 16);
        assert_eq!(header.message_type(), Ok(MessageType::CsRequest));
        assert_eq!(header.timestamp(), -1);
    }

    #[test]
    fn reject_short_buffer() {
        let result = FrameHeader::from_bytes(&[0xAF; 8]);
        assert_eq!(result, Err(ProtocolError::Truncated { expected: 9, got: 8 }));
    }

    #[test]
    fn reject_bad_magic() {
        let bytes = hex!("afafafae 0000 00 0000");
        assert_eq!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::InvalidMagic { expected: 0xAFAF_AFAF, got: 0xAEAF_AFAF })
        );
    }

    #[test]
    fn reject_oversized_payload_length() {
        let bytes = hex!("afafafaf ffff 00 0000");
        assert_eq!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::PayloadTooLarge { size: 65535, max: MAX_PAYLOAD_LEN })
        );
    }

    #[test]
    fn reject_unknown_type() {
        let bytes = hex!("afafafaf 0000 2a 0000");
        assert_eq!(FrameHeader::from_bytes(&bytes), Err(ProtocolError::UnknownMessageType(42)));
    }

    #[test]
    fn new_rejects_oversized_payload() {
        let result = FrameHeader::new(MessageType::Started, MAX_PAYLOAD_LEN + 1, 0);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
            let _ = FrameHeader::from_bytes(&bytes);
        }

        #[test]
        fn accepted_headers_reencode_identically(
            len in 0usize..=MAX_PAYLOAD_LEN,
            kind in 0u8..9,
            timestamp in any::<i16>(),
        ) {
            let kind = MessageType::from_u8(kind).unwrap();
            let header = FrameHeader::new(kind, len, timestamp).unwrap();
            let bytes = header.to_bytes();
            let parsed = FrameHeader::from_bytes(&bytes).unwrap();
            prop_assert_eq!(parsed, &header);
        }
    }
}
