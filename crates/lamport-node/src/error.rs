//! Runtime error types.

use std::io;

use lamport_core::CoreError;
use lamport_proto::{ProcessId, ProtocolError};
use thiserror::Error;

/// Failure of a framed channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Non-transient I/O failure.
    #[error("channel I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Peer closed the stream in the middle of a frame or during a
    /// targeted receive.
    #[error("peer closed the channel after {got} of {expected} bytes")]
    UnexpectedEof {
        /// Bytes the frame part needed.
        expected: usize,
        /// Bytes read before end-of-stream.
        got: usize,
    },

    /// No endpoint for this peer.
    #[error("no channel to process {0}")]
    UnknownPeer(ProcessId),

    /// Every inbound endpoint reported end-of-stream.
    #[error("every inbound channel is closed")]
    AllClosed,

    /// Another process failed and the run is being torn down.
    #[error("run aborted")]
    Aborted,

    /// Received bytes are not a valid frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Failure of one logical process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Channel fault.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Protocol violation.
    #[error(transparent)]
    Protocol(#[from] CoreError),

    /// Event log write failed.
    #[error("event log write failed: {0}")]
    EventLog(#[from] io::Error),
}

impl ProcessError {
    /// Whether this process only stopped because another one failed.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Channel(ChannelError::Aborted))
    }
}

/// Invalid run configuration. Detected before any process starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Worker count outside the supported range.
    #[error("invalid number of processes {got}: expected 1..={max}")]
    Workers {
        /// Requested count.
        got: usize,
        /// Largest supported count.
        max: usize,
    },

    /// Ledger run with the wrong number of initial balances.
    #[error("expected {expected} initial balances, got {got}")]
    BalanceCount {
        /// Worker count.
        expected: usize,
        /// Balances given.
        got: usize,
    },

    /// Options that select different protocols.
    #[error("conflicting options: {0}")]
    Conflict(&'static str),

    /// Transfer order that cannot run on this mesh.
    #[error("invalid transfer: {0}")]
    Transfer(#[source] CoreError),
}

/// Failure of a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Process `id` failed.
    #[error("process {id} failed: {source}")]
    Process {
        /// Failing process.
        id: ProcessId,
        /// Root cause.
        source: ProcessError,
    },

    /// Process `id` panicked.
    #[error("process {id} panicked")]
    Panicked {
        /// Failing process.
        id: ProcessId,
    },

    /// Programs could not be built for the configuration.
    #[error("cannot build process programs: {0}")]
    Setup(#[from] CoreError),

    /// Topology construction or log file failure.
    #[error("setup I/O failed: {0}")]
    Io(#[from] io::Error),
}
