//! Lamport mesh runtime
//!
//! Runs the process programs of `lamport-core` as threads of one OS
//! process, connected by a full mesh of non-blocking Unix socket pairs.
//!
//! # Components
//!
//! - [`channel`]: framed send and receive over one stream
//! - [`topology`]: endpoint table and per-process [`Mesh`]
//! - [`driver`]: executes one [`Process`](lamport_core::Process)
//! - [`runner`]: spawns, aborts and joins the whole run
//! - [`event_log`]: user-facing event lines
//! - [`config`]: command line parsing and validation

pub mod abort;
pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod event_log;
pub mod runner;
pub mod topology;

pub use abort::AbortFlag;
pub use config::{Cli, LogPaths, RunConfig};
pub use error::{ChannelError, ConfigError, ProcessError, RunError};
pub use event_log::{EventLog, EventSink, MemorySink};
pub use runner::run;
pub use topology::{EndpointTable, Mesh};
