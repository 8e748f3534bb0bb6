//! STARTED/DONE synchronization rounds.
//!
//! [`Barrier`] waits for one message from each listed peer in a fixed order
//! and reads each channel directly, so it is immune to traffic on other
//! channels. [`Quorum`] accepts the same messages in any order, for waits
//! that must keep dispatching unrelated traffic.

use std::collections::{BTreeSet, VecDeque};

use lamport_proto::{Message, MessageType, ProcessId};

use crate::error::CoreError;

/// Ordered wait for one message of `kind` from each peer.
#[derive(Debug, Clone)]
pub struct Barrier {
    kind: MessageType,
    remaining: VecDeque<ProcessId>,
}

impl Barrier {
    /// Wait for `kind` from every id in `peers`, in iteration order.
    pub fn new(kind: MessageType, peers: impl IntoIterator<Item = ProcessId>) -> Self {
        Self { kind, remaining: peers.into_iter().collect() }
    }

    /// Message type being collected.
    pub fn kind(&self) -> MessageType {
        self.kind
    }

    /// Peer to read from next, `None` once complete.
    pub fn next_source(&self) -> Option<ProcessId> {
        self.remaining.front().copied()
    }

    /// Record `message` from `from`.
    ///
    /// # Errors
    ///
    /// - `UnexpectedSender` if `from` is not the awaited peer
    /// - `UnexpectedMessage` if the message is not of the barrier's type
    pub fn record(&mut self, from: ProcessId, message: &Message) -> Result<(), CoreError> {
        let expected = self.next_source().ok_or_else(|| CoreError::InvalidState {
            state: format!("{} barrier complete", self.kind),
            operation: "record",
        })?;
        if from != expected {
            return Err(CoreError::UnexpectedSender { expected, got: from });
        }

        let got = message.message_type()?;
        if got != self.kind {
            return Err(CoreError::UnexpectedMessage { from, expected: self.kind, got });
        }

        self.remaining.pop_front();
        Ok(())
    }

    /// Whether every peer has been heard from.
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Unordered wait for one message of `kind` from each member.
#[derive(Debug, Clone)]
pub struct Quorum {
    kind: MessageType,
    members: BTreeSet<ProcessId>,
    seen: BTreeSet<ProcessId>,
}

impl Quorum {
    /// Wait for `kind` from every id in `members`.
    pub fn new(kind: MessageType, members: impl IntoIterator<Item = ProcessId>) -> Self {
        Self { kind, members: members.into_iter().collect(), seen: BTreeSet::new() }
    }

    /// Count `from` without a message, e.g. a process's own contribution.
    pub fn mark(&mut self, from: ProcessId) -> Result<(), CoreError> {
        if !self.members.contains(&from) {
            return Err(CoreError::UnknownProcess(from));
        }
        if !self.seen.insert(from) {
            return Err(CoreError::DuplicateMessage { from, kind: self.kind });
        }
        Ok(())
    }

    /// Record `message` from `from`.
    ///
    /// # Errors
    ///
    /// - `UnexpectedMessage` if the message is not of the quorum's type
    /// - `UnknownProcess` if `from` is not a member
    /// - `DuplicateMessage` if `from` was already counted
    pub fn record(&mut self, from: ProcessId, message: &Message) -> Result<(), CoreError> {
        let got = message.message_type()?;
        if got != self.kind {
            return Err(CoreError::UnexpectedMessage { from, expected: self.kind, got });
        }
        self.mark(from)
    }

    /// Whether every member has been counted.
    pub fn is_complete(&self) -> bool {
        self.seen.len() == self.members.len()
    }

    /// Members not yet counted.
    pub fn missing(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.members.difference(&self.seen).copied()
    }
}
