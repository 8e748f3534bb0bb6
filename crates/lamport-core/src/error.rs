//! Protocol error types.
//!
//! Every variant is fatal to the process that raises it. The testbed has no
//! recovery path: a violation means the run is not trustworthy.

use lamport_proto::{MessageType, ProcessId, ProtocolError, Timestamp, TransferOrder};
use thiserror::Error;

/// Errors raised by the protocol state machines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A message of the wrong type arrived where a specific one was required.
    #[error("expected {expected} from process {from}, got {got}")]
    UnexpectedMessage {
        /// Sender of the offending message.
        from: ProcessId,
        /// Type required at this point.
        expected: MessageType,
        /// Type received.
        got: MessageType,
    },

    /// A message arrived that the current phase has no handler for.
    #[error("unhandled {got} from process {from} while {phase}")]
    UnhandledMessage {
        /// Sender of the offending message.
        from: ProcessId,
        /// Type received.
        got: MessageType,
        /// Phase the process was in.
        phase: &'static str,
    },

    /// A message arrived from a different process than the one awaited.
    #[error("expected a message from process {expected}, got one from {got}")]
    UnexpectedSender {
        /// Process we were waiting on.
        expected: ProcessId,
        /// Process that sent.
        got: ProcessId,
    },

    /// The same process contributed twice to one synchronization round.
    #[error("duplicate {kind} from process {from}")]
    DuplicateMessage {
        /// Sender.
        from: ProcessId,
        /// Type that was duplicated.
        kind: MessageType,
    },

    /// Operation not valid in the current state.
    #[error("invalid state {state} for operation {operation}")]
    InvalidState {
        /// Current state.
        state: String,
        /// Operation attempted.
        operation: &'static str,
    },

    /// A process already has an outstanding critical-section request.
    #[error("process {from} already has an outstanding request")]
    DuplicateRequest {
        /// Requester.
        from: ProcessId,
    },

    /// Release from a process with no queued request.
    #[error("release from process {from} without a queued request")]
    UnknownRequest {
        /// Releasing process.
        from: ProcessId,
    },

    /// Reply received while not requesting, or more replies than peers.
    #[error("unexpected reply from process {from}")]
    UnexpectedReply {
        /// Replying process.
        from: ProcessId,
    },

    /// Local release while our own request is not at the head of the queue.
    #[error("process {id} released while not at the head of the queue")]
    NotAtHead {
        /// Releasing process.
        id: ProcessId,
    },

    /// Process id outside the mesh, or not allowed in this role.
    #[error("unknown process {0}")]
    UnknownProcess(ProcessId),

    /// Mesh size outside the supported range.
    #[error("invalid topology: {workers} workers (supported: 1..={max})")]
    InvalidTopology {
        /// Requested worker count.
        workers: usize,
        /// Largest supported worker count.
        max: usize,
    },

    /// Transfer order that cannot be executed.
    #[error("invalid transfer {order:?}: {reason}")]
    InvalidTransfer {
        /// Offending order.
        order: TransferOrder,
        /// Why it is invalid.
        reason: &'static str,
    },

    /// Initial balances do not match the worker count.
    #[error("expected {expected} initial balances, got {got}")]
    BalanceCount {
        /// Worker count.
        expected: usize,
        /// Balances supplied.
        got: usize,
    },

    /// Lamport clock reached the end of the wire timestamp range.
    #[error("logical clock overflow")]
    ClockOverflow,

    /// Balance arithmetic left the wire range.
    #[error("balance overflow at process {id}")]
    BalanceOverflow {
        /// Affected worker.
        id: ProcessId,
    },

    /// Balance history outgrew what one BALANCE_HISTORY frame can carry.
    #[error("history of process {id} exceeds {max} samples")]
    HistoryTooLong {
        /// Affected worker.
        id: ProcessId,
        /// Sample limit.
        max: usize,
    },

    /// Collected history does not hold exactly one sample per tick from 0.
    #[error("history of process {id} has a gap at tick {time}")]
    IncompleteHistory {
        /// Affected worker.
        id: ProcessId,
        /// First tick without its sample.
        time: Timestamp,
    },

    /// Collected histories do not conserve the initial total.
    #[error("inconsistent history at tick {time}: total {total}, expected {expected}")]
    Inconsistent {
        /// First tick where the sum diverges.
        time: Timestamp,
        /// Sum of balances plus pending transfers at that tick.
        total: i64,
        /// Initial total.
        expected: i64,
    },

    /// Wire-level failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
