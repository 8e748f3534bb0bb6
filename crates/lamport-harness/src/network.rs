//! In-memory mesh with one FIFO queue per ordered pair.
//!
//! Delivery order between two processes is preserved, exactly like a
//! stream channel. Interleaving across pairs is left to the simulation's
//! seeded scheduler.

use std::collections::{BTreeMap, VecDeque};

use lamport_proto::{Message, ProcessId};

/// Messages in flight, keyed by `(from, to)`.
#[derive(Debug, Default)]
pub struct SimNetwork {
    queues: BTreeMap<(ProcessId, ProcessId), VecDeque<Message>>,
}

impl SimNetwork {
    /// Empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `message` on the `from → to` channel.
    pub fn push(&mut self, from: ProcessId, to: ProcessId, message: Message) {
        self.queues.entry((from, to)).or_default().push_back(message);
    }

    /// Oldest message on the `from → to` channel.
    pub fn pop(&mut self, from: ProcessId, to: ProcessId) -> Option<Message> {
        self.queues.get_mut(&(from, to))?.pop_front()
    }

    /// Whether `from → to` has a message waiting.
    pub fn has_pending(&self, from: ProcessId, to: ProcessId) -> bool {
        self.queues.get(&(from, to)).is_some_and(|queue| !queue.is_empty())
    }

    /// Senders with a message waiting for `to`, ascending id.
    pub fn senders_to(&self, to: ProcessId) -> Vec<ProcessId> {
        self.queues
            .iter()
            .filter(|((_, dst), queue)| *dst == to && !queue.is_empty())
            .map(|((src, _), _)| *src)
            .collect()
    }

    /// Messages not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use lamport_proto::Payload;

    use super::*;

    fn message(ts: i16) -> Message {
        Message::new(&Payload::Ack, ts).unwrap()
    }

    #[test]
    fn pairs_are_fifo() {
        let mut network = SimNetwork::new();
        network.push(1, 2, message(1));
        network.push(1, 2, message(2));
        network.push(3, 2, message(7));

        assert_eq!(network.in_flight(), 3);
        assert_eq!(network.senders_to(2), vec![1, 3]);
        assert_eq!(network.pop(1, 2).unwrap().timestamp(), 1);
        assert_eq!(network.pop(1, 2).unwrap().timestamp(), 2);
        assert!(network.pop(1, 2).is_none());
        assert!(!network.has_pending(1, 2));
        assert_eq!(network.senders_to(2), vec![3]);
    }

    #[test]
    fn directions_are_independent() {
        let mut network = SimNetwork::new();
        network.push(1, 2, message(1));

        assert!(network.has_pending(1, 2));
        assert!(!network.has_pending(2, 1));
        assert!(network.senders_to(1).is_empty());
    }
}
