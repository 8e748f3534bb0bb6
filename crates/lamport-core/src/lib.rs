//! Lamport mesh protocol core logic
//!
//! Pure state machines for the two coordination protocols of the testbed,
//! completely decoupled from I/O. This enables deterministic testing of
//! every interleaving the network can produce.
//!
//! # Architecture
//!
//! Every logical process is a [`Process`]: a state machine owning its
//! Lamport clock and protocol state. The caller asks it what it is waiting
//! for ([`Process::next_step`]), performs that receive, and feeds the
//! message back through [`Process::handle`]. State transitions produce
//! declarative [`Action`]s (send, multicast, log, publish) that a runtime or
//! a simulation harness executes.
//!
//! ```text
//!             ┌────────────────────────────┐
//!             │ lamport-core               │
//!             │ - clock, barriers          │
//!             │ - mutex engine, ledger     │
//!             └────────────────────────────┘
//!                ↓                      ↓
//!     ┌──────────────────┐   ┌──────────────────┐
//!     │ lamport-harness  │   │ lamport-node     │
//!     │ - seeded network │   │ - socket pairs   │
//!     │ - oracles        │   │ - threads, logs  │
//!     └──────────────────┘   └──────────────────┘
//! ```
//!
//! # Components
//!
//! - [`clock`]: Lamport clock
//! - [`topology`]: process ids of a full mesh
//! - [`sync`]: STARTED/DONE synchronization
//! - [`mutex`]: Lamport mutual-exclusion engine
//! - [`workload`]: critical-section loop programs
//! - [`ledger`]: transfer protocol and balance history
//! - [`protocol`]: run configuration → process programs

pub mod action;
pub mod clock;
pub mod error;
pub mod event;
pub mod ledger;
pub mod mutex;
pub mod process;
pub mod protocol;
pub mod sync;
pub mod topology;
pub mod workload;

pub use action::{Action, Source, Step};
pub use clock::LamportClock;
pub use error::CoreError;
pub use event::Event;
pub use process::{Process, ProcessSnapshot};
pub use protocol::{Iterations, Protocol};
pub use topology::Topology;
