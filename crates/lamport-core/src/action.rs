//! Outputs of the protocol state machines.
//!
//! A process never touches a channel. It returns actions, and whoever drives
//! it (the threaded runtime or the simulation harness) performs them in
//! order.

use lamport_proto::{Message, ProcessId};

use crate::{event::Event, ledger::AllHistory};

/// Side effect requested by a [`crate::Process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send `message` to one peer.
    Send {
        /// Destination process.
        to: ProcessId,
        /// Stamped message.
        message: Message,
    },

    /// Send the same stamped `message` to every peer, ascending id order.
    Multicast {
        /// Stamped message, delivered byte-identical to every peer.
        message: Message,
    },

    /// Write one event line to the event log.
    Log(Event),

    /// Hand the collected balance report to the caller.
    Publish(AllHistory),
}

/// Where the next message must come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Only this peer; other channels are not read.
    From(ProcessId),
    /// Whichever peer has data first.
    Any,
}

/// What a process needs from its driver next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Deliver one message from `Source`.
    Receive(Source),
    /// The process holds the critical section. The driver performs the
    /// guarded work, then calls [`crate::Process::leave_critical_section`].
    CriticalSection,
    /// Nothing left to do.
    Finished,
}
