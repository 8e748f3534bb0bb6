//! What a simulated run did, in execution order.

use lamport_core::{Event, ProcessSnapshot, ledger::AllHistory, mutex::Request};
use lamport_proto::{MessageType, ProcessId, Timestamp};

/// One observable step of a simulated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEntry {
    /// A message was queued on `from → to`.
    Sent {
        /// Sender.
        from: ProcessId,
        /// Destination.
        to: ProcessId,
        /// Message type.
        kind: MessageType,
        /// Header timestamp.
        timestamp: Timestamp,
    },

    /// A message was handed to its destination.
    Delivered {
        /// Sender.
        from: ProcessId,
        /// Destination.
        to: ProcessId,
        /// Message type.
        kind: MessageType,
        /// Header timestamp.
        timestamp: Timestamp,
        /// Destination clock before handling.
        clock_before: Timestamp,
        /// Destination clock after handling.
        clock_after: Timestamp,
    },

    /// `id` entered the critical section holding `request`.
    Entered {
        /// Process id.
        id: ProcessId,
        /// The request that was granted, if one was seen on the wire.
        request: Option<Request>,
    },

    /// `id` left the critical section.
    Left {
        /// Process id.
        id: ProcessId,
    },
}

/// Complete record of a finished simulation.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    pub(crate) entries: Vec<TraceEntry>,
    pub(crate) events: Vec<Event>,
    pub(crate) report: Option<AllHistory>,
    pub(crate) snapshots: Vec<ProcessSnapshot>,
    pub(crate) steps: usize,
}

impl Trace {
    /// Every entry, in execution order.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Event log lines, in recording order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Balance report published by the ledger coordinator.
    pub fn report(&self) -> Option<&AllHistory> {
        self.report.as_ref()
    }

    /// Final state of every process, ascending id.
    pub fn snapshots(&self) -> &[ProcessSnapshot] {
        &self.snapshots
    }

    /// Final state of `id`.
    pub fn snapshot(&self, id: ProcessId) -> Option<&ProcessSnapshot> {
        self.snapshots.iter().find(|snapshot| snapshot.id == id)
    }

    /// Scheduler steps taken.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Critical-section entries, in order.
    pub fn cs_entries(&self) -> impl Iterator<Item = (ProcessId, Option<Request>)> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            TraceEntry::Entered { id, request } => Some((*id, *request)),
            _ => None,
        })
    }

    /// Deliveries of `kind`, in order, as `(from, to)`.
    pub fn deliveries_of(
        &self,
        kind: MessageType,
    ) -> impl Iterator<Item = (ProcessId, ProcessId)> + '_ {
        self.entries.iter().filter_map(move |entry| match entry {
            TraceEntry::Delivered { from, to, kind: k, .. } if *k == kind => Some((*from, *to)),
            _ => None,
        })
    }

    /// Event lines rendered as the event log would show them.
    pub fn lines(&self) -> Vec<String> {
        self.events.iter().map(ToString::to_string).collect()
    }
}
