//! Lamport logical clock.
//!
//! One counter per process, owned exclusively by that process's state
//! machine. Two rules:
//!
//! - send: increment, then stamp the outgoing message with the new value
//! - receive: `max(local, received) + 1`
//!
//! Together with the process id as a tie-breaker this gives the total order
//! the mutual-exclusion queue relies on.

use lamport_proto::{Message, Payload, Timestamp};

use crate::error::CoreError;

/// Lamport clock over the wire timestamp range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LamportClock {
    time: Timestamp,
}

impl LamportClock {
    /// Clock at tick 0.
    pub const fn new() -> Self {
        Self { time: 0 }
    }

    /// Current value.
    pub const fn now(&self) -> Timestamp {
        self.time
    }

    /// Advance for a local or send event.
    pub fn tick(&mut self) -> Result<Timestamp, CoreError> {
        self.time = self.time.checked_add(1).ok_or(CoreError::ClockOverflow)?;
        Ok(self.time)
    }

    /// Advance for a receive of a message stamped `received`.
    pub fn observe(&mut self, received: Timestamp) -> Result<Timestamp, CoreError> {
        self.time = self.time.max(received).checked_add(1).ok_or(CoreError::ClockOverflow)?;
        Ok(self.time)
    }

    /// Tick and build a message stamped with the new value.
    pub fn stamp(&mut self, payload: &Payload) -> Result<Message, CoreError> {
        let time = self.tick()?;
        Ok(Message::new(payload, time)?)
    }
}
