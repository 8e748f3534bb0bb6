//! Lifecycle events and their log line formats.
//!
//! Every line starts with the logical timestamp of the event. Sinks append
//! the trailing newline; STARTED and DONE messages carry the same text as
//! their payload, so a peer sees exactly what the sender logged.

use std::fmt;

use lamport_proto::{Balance, ProcessId, Timestamp};

/// One human-readable lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Process finished initialization.
    Started {
        /// Logical time.
        time: Timestamp,
        /// Process.
        id: ProcessId,
        /// Opening balance, ledger workers only.
        balance: Option<Balance>,
    },
    /// STARTED received from every peer.
    ReceivedAllStarted {
        /// Logical time.
        time: Timestamp,
        /// Process.
        id: ProcessId,
    },
    /// Process finished its useful work.
    Done {
        /// Logical time.
        time: Timestamp,
        /// Process.
        id: ProcessId,
        /// Closing balance, ledger workers only.
        balance: Option<Balance>,
    },
    /// DONE received from every peer.
    ReceivedAllDone {
        /// Logical time.
        time: Timestamp,
        /// Process.
        id: ProcessId,
    },
    /// Source side of a transfer.
    TransferOut {
        /// Logical time.
        time: Timestamp,
        /// Source worker.
        id: ProcessId,
        /// Destination worker.
        to: ProcessId,
        /// Amount moved.
        amount: Balance,
    },
    /// Destination side of a transfer.
    TransferIn {
        /// Logical time.
        time: Timestamp,
        /// Destination worker.
        id: ProcessId,
        /// Source worker.
        from: ProcessId,
        /// Amount moved.
        amount: Balance,
    },
    /// One unit of loop work, inside the critical section when mutual
    /// exclusion is on.
    LoopOperation {
        /// Logical time.
        time: Timestamp,
        /// Worker.
        id: ProcessId,
        /// 1-based iteration.
        iteration: u32,
        /// Total iterations.
        total: u32,
    },
}

impl Event {
    /// Logical time the event happened at.
    pub fn time(&self) -> Timestamp {
        match self {
            Self::Started { time, .. }
            | Self::ReceivedAllStarted { time, .. }
            | Self::Done { time, .. }
            | Self::ReceivedAllDone { time, .. }
            | Self::TransferOut { time, .. }
            | Self::TransferIn { time, .. }
            | Self::LoopOperation { time, .. } => *time,
        }
    }

    /// Process that logged the event.
    pub fn process(&self) -> ProcessId {
        match self {
            Self::Started { id, .. }
            | Self::ReceivedAllStarted { id, .. }
            | Self::Done { id, .. }
            | Self::ReceivedAllDone { id, .. }
            | Self::TransferOut { id, .. }
            | Self::TransferIn { id, .. }
            | Self::LoopOperation { id, .. } => *id,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { time, id, balance } => {
                write!(f, "{time}: process {id} has STARTED")?;
                if let Some(balance) = balance {
                    write!(f, " with balance ${balance:>2}")?;
                }
                Ok(())
            },
            Self::ReceivedAllStarted { time, id } => {
                write!(f, "{time}: process {id} received all STARTED messages")
            },
            Self::Done { time, id, balance } => {
                write!(f, "{time}: process {id} has DONE")?;
                if let Some(balance) = balance {
                    write!(f, " with balance ${balance:>2}")?;
                }
                Ok(())
            },
            Self::ReceivedAllDone { time, id } => {
                write!(f, "{time}: process {id} received all DONE messages")
            },
            Self::TransferOut { time, id, to, amount } => {
                write!(f, "{time}: process {id} transferred ${amount:>2} to process {to}")
            },
            Self::TransferIn { time, id, from, amount } => {
                write!(f, "{time}: process {id} received ${amount:>2} from process {from}")
            },
            Self::LoopOperation { time, id, iteration, total } => {
                write!(f, "{time}: process {id} is doing {iteration} iteration out of {total}")
            },
        }
    }
}
