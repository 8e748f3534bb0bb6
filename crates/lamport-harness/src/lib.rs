//! Deterministic simulation harness for the Lamport mesh protocols.
//!
//! Runs the Sans-IO programs of `lamport-core` over an in-memory network
//! with per-pair FIFO delivery. A seeded scheduler decides which process
//! moves next, so a failing interleaving is reproduced from its seed alone.
//!
//! - [`network`]: one FIFO queue per ordered pair
//! - [`sim`]: seeded scheduler driving every process
//! - [`trace`]: record of sends, deliveries and critical sections
//! - [`scenario`]: builder with a mandatory oracle, and reusable oracles

#![forbid(unsafe_code)]

pub mod network;
pub mod scenario;
pub mod sim;
pub mod trace;

pub use network::SimNetwork;
pub use sim::{SimError, Simulation};
pub use trace::{Trace, TraceEntry};
