//! Transfer order payload.

use bytes::Bytes;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, byteorder::little_endian::I16,
};

use crate::{
    Balance, ProcessId,
    errors::{ProtocolError, Result},
};

/// Move `amount` from worker `src` to worker `dst`.
///
/// # Protocol Flow
///
/// 1. Coordinator sends the order to `src`
/// 2. `src` debits itself and forwards the same order to `dst`
/// 3. `dst` credits itself and sends ACK to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferOrder {
    /// Debited worker.
    pub src: ProcessId,
    /// Credited worker.
    pub dst: ProcessId,
    /// Amount moved.
    pub amount: Balance,
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawTransfer {
    src: u8,
    dst: u8,
    amount: I16,
}

impl TransferOrder {
    /// Encoded size in bytes.
    pub const SIZE: usize = size_of::<RawTransfer>();

    /// Serialize to the 4-byte wire layout.
    pub fn encode(&self) -> Bytes {
        let raw = RawTransfer { src: self.src, dst: self.dst, amount: I16::new(self.amount) };
        Bytes::copy_from_slice(raw.as_bytes())
    }

    /// Parse the 4-byte wire layout.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let raw = RawTransfer::read_from_bytes(bytes).map_err(|_| {
            ProtocolError::MalformedPayload {
                kind: "TRANSFER",
                reason: format!("expected {} bytes, got {}", Self::SIZE, bytes.len()),
            }
        })?;

        Ok(Self { src: raw.src, dst: raw.dst, amount: raw.amount.get() })
    }
}
