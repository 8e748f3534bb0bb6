//! Runs one process program over its endpoints.

use lamport_core::{Action, Process, Source, Step};
use tracing::{debug, info};

use crate::{error::ProcessError, event_log::EventSink, topology::Mesh};

/// Drive `process` until it finishes, performing every action it returns.
///
/// # Errors
///
/// The first channel fault, protocol violation or event log failure. The
/// process is left in an unspecified state.
pub fn drive(
    process: &mut dyn Process,
    mesh: &mut Mesh,
    sink: &dyn EventSink,
) -> Result<(), ProcessError> {
    let id = process.id();
    let actions = process.start()?;
    execute(actions, mesh, sink)?;

    loop {
        let actions = match process.next_step() {
            Step::Receive(Source::From(peer)) => {
                let message = mesh.receive(peer)?;
                process.handle(peer, &message)?
            },
            Step::Receive(Source::Any) => {
                let (peer, message) = mesh.receive_any()?;
                process.handle(peer, &message)?
            },
            Step::CriticalSection => {
                debug!(id, "in critical section");
                process.leave_critical_section()?
            },
            Step::Finished => {
                info!(id, clock = process.snapshot().clock, "process finished");
                return Ok(());
            },
        };
        execute(actions, mesh, sink)?;
    }
}

fn execute(
    actions: Vec<Action>,
    mesh: &mut Mesh,
    sink: &dyn EventSink,
) -> Result<(), ProcessError> {
    for action in actions {
        match action {
            Action::Send { to, message } => mesh.send(to, &message)?,
            Action::Multicast { message } => mesh.send_multicast(&message)?,
            Action::Log(event) => sink.record(&event)?,
            Action::Publish(report) => sink.publish(&report)?,
        }
    }
    Ok(())
}
