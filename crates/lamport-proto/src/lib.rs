//! Wire format for the Lamport mesh testbed.
//!
//! Every message on a channel is one frame: a fixed 9-byte little-endian
//! header followed by `payload_len` payload bytes. The header carries the
//! magic sentinel, the payload length, the message type and the sender's
//! Lamport timestamp, so a receiver can validate and size the body before
//! touching it.
//!
//! ```text
//! 0       4        6      7           9
//! ┌───────┬────────┬──────┬───────────┬─────────────────────┐
//! │ magic │ length │ type │ timestamp │ payload (length B)  │
//! │  u32  │  u16   │  u8  │    i16    │                     │
//! └───────┴────────┴──────┴───────────┴─────────────────────┘
//! ```
//!
//! # Security
//!
//! Header parsing goes through `zerocopy` layouts; nothing is read past a
//! validated length. A frame whose magic does not match is rejected before
//! its length is trusted, since a desynchronized stream would otherwise make
//! us read garbage as a body.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod frame;
pub mod header;
pub mod message_type;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Message;
pub use header::FrameHeader;
pub use message_type::MessageType;
pub use payloads::{BalanceHistory, BalanceState, Payload, TransferOrder};

/// Local identifier of a process in the mesh. The coordinator is always 0.
pub type ProcessId = u8;

/// Lamport timestamp carried in every frame header.
pub type Timestamp = i16;

/// Account balance or transfer amount.
pub type Balance = i16;

/// Identifier of the coordinating process.
pub const COORDINATOR: ProcessId = 0;

/// Upper bound on the number of worker processes in one mesh.
pub const MAX_WORKERS: usize = 15;
