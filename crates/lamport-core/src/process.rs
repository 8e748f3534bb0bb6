//! The process abstraction shared by every program.

use lamport_proto::{Balance, Message, ProcessId, Timestamp};

use crate::{
    action::{Action, Step},
    error::CoreError,
    mutex::MutexState,
};

/// Observable state of a process, for oracles and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    /// Process id.
    pub id: ProcessId,
    /// Current Lamport time.
    pub clock: Timestamp,
    /// Current balance, ledger workers only.
    pub balance: Option<Balance>,
    /// Mutual-exclusion state, loop workers with mutual exclusion only.
    pub mutex: Option<MutexState>,
    /// Whether the process reached [`Step::Finished`].
    pub finished: bool,
}

/// One logical process of the mesh as a Sans-IO state machine.
///
/// Drivers call [`Process::start`] once, then loop on
/// [`Process::next_step`] until it returns [`Step::Finished`]. Every
/// returned action must be executed, in order, before the next call.
pub trait Process {
    /// Process id.
    fn id(&self) -> ProcessId;

    /// Initial actions. Called exactly once, before anything else.
    fn start(&mut self) -> Result<Vec<Action>, CoreError>;

    /// What the process is waiting for.
    fn next_step(&self) -> Step;

    /// Handle one message received from `from`.
    ///
    /// # Errors
    ///
    /// Any protocol violation. The process must not be driven further after
    /// an error.
    fn handle(&mut self, from: ProcessId, message: &Message) -> Result<Vec<Action>, CoreError>;

    /// Finish the guarded work and release the critical section.
    ///
    /// Only valid while [`Process::next_step`] is
    /// [`Step::CriticalSection`].
    fn leave_critical_section(&mut self) -> Result<Vec<Action>, CoreError> {
        Err(CoreError::InvalidState {
            state: format!("{:?}", self.next_step()),
            operation: "leave_critical_section",
        })
    }

    /// Current observable state.
    fn snapshot(&self) -> ProcessSnapshot;
}
