//! Balance history payload.
//!
//! Layout: a 3-byte prefix `{id: u8, len: u16}` followed by `len` 6-byte
//! samples `{time: i16, balance: i16, pending_in: i16}`.

use bytes::{BufMut, Bytes, BytesMut};
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::little_endian::{I16, U16},
};

use crate::{
    Balance, ProcessId, Timestamp,
    errors::{ProtocolError, Result},
    header::MAX_PAYLOAD_LEN,
};

/// Balance of one worker as of the end of one logical tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BalanceState {
    /// Logical tick.
    pub time: Timestamp,
    /// Balance at that tick.
    pub balance: Balance,
    /// Money sent to this worker before the tick but not yet delivered.
    pub pending_in: Balance,
}

/// Gapless balance timeline of one worker, one sample per tick from 0.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BalanceHistory {
    /// Worker the history belongs to.
    pub id: ProcessId,
    /// Samples, `states[t].time == t`.
    pub states: Vec<BalanceState>,
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawHistoryPrefix {
    id: u8,
    len: U16,
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawBalanceState {
    time: I16,
    balance: I16,
    pending_in: I16,
}

const PREFIX_SIZE: usize = size_of::<RawHistoryPrefix>();
const STATE_SIZE: usize = size_of::<RawBalanceState>();

impl BalanceHistory {
    /// Most samples one BALANCE_HISTORY frame can carry.
    pub const MAX_STATES: usize = (MAX_PAYLOAD_LEN - PREFIX_SIZE) / STATE_SIZE;

    /// Create an empty history for `id`.
    pub fn new(id: ProcessId) -> Self {
        Self { id, states: Vec::new() }
    }

    /// Last recorded tick, if any.
    pub fn last_time(&self) -> Option<Timestamp> {
        self.states.last().map(|state| state.time)
    }

    /// Serialize to the wire layout.
    pub fn encode(&self) -> Result<Bytes> {
        if self.states.len() > Self::MAX_STATES {
            return Err(ProtocolError::PayloadTooLarge {
                size: PREFIX_SIZE + self.states.len() * STATE_SIZE,
                max: MAX_PAYLOAD_LEN,
            });
        }

        let mut buf = BytesMut::with_capacity(PREFIX_SIZE + self.states.len() * STATE_SIZE);
        let prefix = RawHistoryPrefix { id: self.id, len: U16::new(self.states.len() as u16) };
        buf.put_slice(prefix.as_bytes());

        for state in &self.states {
            let raw = RawBalanceState {
                time: I16::new(state.time),
                balance: I16::new(state.balance),
                pending_in: I16::new(state.pending_in),
            };
            buf.put_slice(raw.as_bytes());
        }

        Ok(buf.freeze())
    }

    /// Parse the wire layout.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (prefix, rest) = RawHistoryPrefix::read_from_prefix(bytes)
            .map_err(|_| malformed(format!("prefix needs {PREFIX_SIZE} bytes")))?;

        let len = usize::from(prefix.len.get());
        if rest.len() != len * STATE_SIZE {
            return Err(malformed(format!(
                "{len} samples need {} bytes, got {}",
                len * STATE_SIZE,
                rest.len()
            )));
        }

        let states = rest
            .chunks_exact(STATE_SIZE)
            .map(|chunk| {
                RawBalanceState::read_from_bytes(chunk)
                    .map(|raw| BalanceState {
                        time: raw.time.get(),
                        balance: raw.balance.get(),
                        pending_in: raw.pending_in.get(),
                    })
                    .map_err(|_| malformed(format!("sample needs {STATE_SIZE} bytes")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { id: prefix.id, states })
    }
}

fn malformed(reason: String) -> ProtocolError {
    ProtocolError::MalformedPayload { kind: "BALANCE_HISTORY", reason }
}
