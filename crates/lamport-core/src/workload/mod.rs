//! Critical-section loop programs.
//!
//! Each worker performs a fixed number of loop operations, one log line per
//! iteration. With mutual exclusion enabled every iteration happens inside
//! the distributed critical section, so the lines of different workers
//! never interleave. The coordinator only witnesses the run.

mod coordinator;
mod worker;

pub use coordinator::LoopCoordinator;
pub use worker::LoopWorker;
