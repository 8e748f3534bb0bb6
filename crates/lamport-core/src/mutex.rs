//! Lamport mutual exclusion.
//!
//! Every worker keeps a queue of outstanding requests ordered by
//! `(timestamp, id)`. A request is multicast once; every peer enqueues it
//! and replies immediately, whatever its own state. A worker enters the
//! critical section when it holds a reply from every other worker for its
//! latest request and its own entry is the queue minimum. Releasing removes
//! the entry locally and at every peer.
//!
//! # Invariants
//!
//! - At most one queue entry per process, so at most `peer_count + 1`.
//! - Entry only from `Requesting`, only at the head, only with all replies.
//! - Replies are counted per peer; a second reply for one request is a
//!   protocol violation.
//!
//! The engine does not advance the clock on receive; callers observe the
//! incoming timestamp before dispatching.

use std::collections::BTreeSet;

use lamport_proto::{Message, MessageType, Payload, ProcessId, Timestamp};
use tracing::debug;

use crate::{action::Action, clock::LamportClock, error::CoreError};

/// Queue entry. Field order gives the `(timestamp, id)` total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Request {
    /// Timestamp of the CS_REQUEST.
    pub timestamp: Timestamp,
    /// Requesting process.
    pub id: ProcessId,
}

/// Ordered set of outstanding requests, one per process.
#[derive(Debug, Clone, Default)]
pub struct RequestQueue {
    entries: BTreeSet<Request>,
}

impl RequestQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `request`.
    ///
    /// # Errors
    ///
    /// `DuplicateRequest` if the requester already has an entry.
    pub fn insert(&mut self, request: Request) -> Result<(), CoreError> {
        if self.contains(request.id) {
            return Err(CoreError::DuplicateRequest { from: request.id });
        }
        self.entries.insert(request);
        Ok(())
    }

    /// Remove the entry of `id`.
    ///
    /// # Errors
    ///
    /// `UnknownRequest` if `id` has no entry.
    pub fn remove(&mut self, id: ProcessId) -> Result<Request, CoreError> {
        let request = self
            .entries
            .iter()
            .find(|request| request.id == id)
            .copied()
            .ok_or(CoreError::UnknownRequest { from: id })?;
        self.entries.remove(&request);
        Ok(request)
    }

    /// Whether `id` has an entry.
    pub fn contains(&self, id: ProcessId) -> bool {
        self.entries.iter().any(|request| request.id == id)
    }

    /// Queue minimum.
    pub fn head(&self) -> Option<Request> {
        self.entries.first().copied()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in queue order.
    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.entries.iter()
    }
}

/// Local mutual-exclusion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexState {
    /// No outstanding request.
    Idle,
    /// Request multicast, waiting for replies and the head position.
    Requesting,
    /// Holding the critical section.
    InCriticalSection,
}

/// Mutual-exclusion engine of one worker.
#[derive(Debug, Clone)]
pub struct MutexEngine {
    id: ProcessId,
    peers: BTreeSet<ProcessId>,
    queue: RequestQueue,
    replies: BTreeSet<ProcessId>,
    state: MutexState,
    own: Option<Request>,
}

impl MutexEngine {
    /// Engine for `id` competing with `peers` (the other workers).
    pub fn new(id: ProcessId, peers: impl IntoIterator<Item = ProcessId>) -> Self {
        Self {
            id,
            peers: peers.into_iter().filter(|peer| *peer != id).collect(),
            queue: RequestQueue::new(),
            replies: BTreeSet::new(),
            state: MutexState::Idle,
            own: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> MutexState {
        self.state
    }

    /// Our outstanding request, if any.
    pub fn own_request(&self) -> Option<Request> {
        self.own
    }

    /// Request queue.
    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Number of competing workers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Start competing: returns the CS_REQUEST to multicast.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless idle.
    pub fn acquire(&mut self, clock: &mut LamportClock) -> Result<Message, CoreError> {
        self.require(MutexState::Idle, "acquire")?;

        let message = clock.stamp(&Payload::CsRequest)?;
        let request = Request { timestamp: message.timestamp(), id: self.id };
        self.queue.insert(request)?;
        self.own = Some(request);
        self.replies.clear();
        self.state = MutexState::Requesting;

        debug!(id = self.id, timestamp = request.timestamp, "requesting critical section");
        Ok(message)
    }

    /// Peer `from` requested at `timestamp`: enqueue it and return the
    /// CS_REPLY to send back.
    pub fn on_request(
        &mut self,
        clock: &mut LamportClock,
        from: ProcessId,
        timestamp: Timestamp,
    ) -> Result<Message, CoreError> {
        self.require_peer(from)?;
        self.queue.insert(Request { timestamp, id: from })?;
        clock.stamp(&Payload::CsReply)
    }

    /// Peer `from` granted our current request.
    ///
    /// # Errors
    ///
    /// `UnexpectedReply` when not requesting or when `from` already replied.
    pub fn on_reply(&mut self, from: ProcessId) -> Result<(), CoreError> {
        self.require_peer(from)?;
        if self.state != MutexState::Requesting || !self.replies.insert(from) {
            return Err(CoreError::UnexpectedReply { from });
        }
        Ok(())
    }

    /// Peer `from` left the critical section.
    pub fn on_release(&mut self, from: ProcessId) -> Result<(), CoreError> {
        self.require_peer(from)?;
        self.queue.remove(from)?;
        Ok(())
    }

    /// Enter the critical section if allowed. Returns whether we are in it.
    pub fn try_enter(&mut self) -> bool {
        match self.state {
            MutexState::InCriticalSection => true,
            MutexState::Idle => false,
            MutexState::Requesting => {
                let granted = self.replies.len() == self.peers.len();
                if granted && self.own.is_some() && self.queue.head() == self.own {
                    debug!(id = self.id, "entering critical section");
                    self.state = MutexState::InCriticalSection;
                    true
                } else {
                    false
                }
            },
        }
    }

    /// Leave the critical section: returns the CS_RELEASE to multicast.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless in the critical section
    /// - `NotAtHead` if our entry is missing or not the queue minimum
    pub fn release(&mut self, clock: &mut LamportClock) -> Result<Message, CoreError> {
        self.require(MutexState::InCriticalSection, "release")?;

        let own = self.own.ok_or(CoreError::NotAtHead { id: self.id })?;
        if self.queue.head() != Some(own) {
            return Err(CoreError::NotAtHead { id: self.id });
        }
        self.queue.remove(self.id)?;
        self.own = None;
        self.replies.clear();
        self.state = MutexState::Idle;

        debug!(id = self.id, "released critical section");
        clock.stamp(&Payload::CsRelease)
    }

    /// Dispatch one critical-section message received from `from`.
    ///
    /// # Errors
    ///
    /// `UnhandledMessage` for any non critical-section type, plus whatever
    /// the individual handlers raise.
    pub fn handle(
        &mut self,
        clock: &mut LamportClock,
        from: ProcessId,
        message: &Message,
    ) -> Result<Vec<Action>, CoreError> {
        match message.message_type()? {
            MessageType::CsRequest => {
                let reply = self.on_request(clock, from, message.timestamp())?;
                Ok(vec![Action::Send { to: from, message: reply }])
            },
            MessageType::CsReply => {
                self.on_reply(from)?;
                Ok(Vec::new())
            },
            MessageType::CsRelease => {
                self.on_release(from)?;
                Ok(Vec::new())
            },
            got => Err(CoreError::UnhandledMessage { from, got, phase: "mutual exclusion" }),
        }
    }

    fn require(&self, state: MutexState, operation: &'static str) -> Result<(), CoreError> {
        if self.state == state {
            Ok(())
        } else {
            Err(CoreError::InvalidState { state: format!("{:?}", self.state), operation })
        }
    }

    fn require_peer(&self, from: ProcessId) -> Result<(), CoreError> {
        if self.peers.contains(&from) { Ok(()) } else { Err(CoreError::UnknownProcess(from)) }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn request(clock: &mut LamportClock) -> Message {
        clock.stamp(&Payload::CsRequest).unwrap()
    }

    #[test]
    fn single_worker_enters_immediately() {
        let mut clock = LamportClock::new();
        let mut engine = MutexEngine::new(1, [1]);

        engine.acquire(&mut clock).unwrap();
        assert!(engine.try_enter());
        assert_eq!(engine.state(), MutexState::InCriticalSection);

        let release = engine.release(&mut clock).unwrap();
        assert_eq!(release.message_type().unwrap(), MessageType::CsRelease);
        assert_eq!(engine.state(), MutexState::Idle);
        assert!(engine.queue().is_empty());
    }

    #[test]
    fn waits_for_every_reply() {
        let mut clock = LamportClock::new();
        let mut engine = MutexEngine::new(1, [2, 3]);

        engine.acquire(&mut clock).unwrap();
        engine.on_reply(2).unwrap();
        assert!(!engine.try_enter());

        engine.on_reply(3).unwrap();
        assert!(engine.try_enter());
    }

    #[test]
    fn lower_peer_request_blocks_entry_until_release() {
        let mut clock = LamportClock::new();
        let mut engine = MutexEngine::new(2, [1]);

        // Peer 1 requested at 1 before seeing anything from us.
        let mut peer_clock = LamportClock::new();
        let peer_request = request(&mut peer_clock);

        engine.acquire(&mut clock).unwrap();
        clock.observe(peer_request.timestamp()).unwrap();
        let actions = engine.handle(&mut clock, 1, &peer_request).unwrap();
        assert!(matches!(
            actions.as_slice(),
            [Action::Send { to: 1, message }] if message.message_type().unwrap() == MessageType::CsReply
        ));

        engine.on_reply(1).unwrap();
        // Tie on timestamp 1: id 1 wins.
        assert!(!engine.try_enter());

        engine.on_release(1).unwrap();
        assert!(engine.try_enter());
    }

    #[test]
    fn request_while_requesting_with_lower_timestamp() {
        let mut clock = LamportClock::new();
        let mut engine = MutexEngine::new(1, [2]);

        let own = engine.acquire(&mut clock).unwrap();
        assert_eq!(own.timestamp(), 1);

        // Peer 2 saw our request before asking, so its timestamp is higher.
        let mut peer_clock = LamportClock::new();
        peer_clock.observe(own.timestamp()).unwrap();
        let peer_request = request(&mut peer_clock);

        clock.observe(peer_request.timestamp()).unwrap();
        let actions = engine.handle(&mut clock, 2, &peer_request).unwrap();

        assert_eq!(actions.len(), 1);
        assert_eq!(engine.queue().len(), 2);
        assert_eq!(engine.queue().head(), Some(Request { timestamp: 1, id: 1 }));

        engine.on_reply(2).unwrap();
        assert!(engine.try_enter());
    }

    #[test]
    fn duplicate_request_rejected() {
        let mut clock = LamportClock::new();
        let mut engine = MutexEngine::new(1, [2]);

        engine.on_request(&mut clock, 2, 1).unwrap();
        assert_eq!(
            engine.on_request(&mut clock, 2, 3).unwrap_err(),
            CoreError::DuplicateRequest { from: 2 }
        );
    }

    #[test]
    fn reply_rules() {
        let mut clock = LamportClock::new();
        let mut engine = MutexEngine::new(1, [2]);

        assert_eq!(engine.on_reply(2), Err(CoreError::UnexpectedReply { from: 2 }));

        engine.acquire(&mut clock).unwrap();
        engine.on_reply(2).unwrap();
        assert_eq!(engine.on_reply(2), Err(CoreError::UnexpectedReply { from: 2 }));
        assert_eq!(engine.on_reply(7), Err(CoreError::UnknownProcess(7)));
    }

    #[test]
    fn release_rules() {
        let mut clock = LamportClock::new();
        let mut engine = MutexEngine::new(1, [2]);

        assert!(matches!(engine.release(&mut clock), Err(CoreError::InvalidState { .. })));
        assert_eq!(engine.on_release(2), Err(CoreError::UnknownRequest { from: 2 }));
    }

    #[test]
    fn non_mutex_message_is_unhandled() {
        let mut clock = LamportClock::new();
        let mut engine = MutexEngine::new(1, [2]);
        let stop = Message::new(&Payload::Stop, 4).unwrap();

        assert_eq!(
            engine.handle(&mut clock, 2, &stop),
            Err(CoreError::UnhandledMessage { from: 2, got: MessageType::Stop, phase: "mutual exclusion" })
        );
    }

    proptest! {
        #[test]
        fn queue_head_is_minimum(entries in proptest::collection::btree_map(1u8..16, 0i16..100, 0..15)) {
            let mut queue = RequestQueue::new();
            for (id, timestamp) in &entries {
                queue.insert(Request { timestamp: *timestamp, id: *id }).unwrap();
            }

            let expected = entries.iter().map(|(id, timestamp)| (*timestamp, *id)).min();
            prop_assert_eq!(queue.head().map(|r| (r.timestamp, r.id)), expected);
            prop_assert_eq!(queue.len(), entries.len());

            let order: Vec<_> = queue.iter().map(|r| (r.timestamp, r.id)).collect();
            let mut sorted = order.clone();
            sorted.sort_unstable();
            prop_assert_eq!(order, sorted);
        }
    }
}
