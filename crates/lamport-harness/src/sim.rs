//! Seeded single-threaded simulation of a whole mesh.
//!
//! Every process runs its program against a [`SimNetwork`]. At each step the
//! scheduler picks, with a seeded `ChaCha8Rng`, one process that can make
//! progress: a receive with a message waiting, or a critical section to
//! leave. Receive-any picks among the non-empty inbound channels at random,
//! so one seed explores one interleaving and the same seed always replays
//! it.

use std::collections::{BTreeMap, BTreeSet};

use lamport_core::{
    Action, CoreError, Process, Protocol, Source, Step, Topology, mutex::Request,
};
use lamport_proto::{Message, MessageType, ProcessId, ProtocolError};
use rand::{SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    network::SimNetwork,
    trace::{Trace, TraceEntry},
};

/// Upper bound on scheduler steps unless overridden.
pub const DEFAULT_MAX_STEPS: usize = 1_000_000;

/// Failure of a simulated run.
#[derive(Debug, Error)]
pub enum SimError {
    /// Programs could not be built.
    #[error("cannot build programs: {0}")]
    Setup(#[source] CoreError),

    /// A process reported a protocol violation.
    #[error("process {id} failed: {source}")]
    Process {
        /// Failing process.
        id: ProcessId,
        /// Violation.
        source: CoreError,
    },

    /// A process emitted a message that does not decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Some processes wait for messages nobody will send.
    #[error("deadlock: processes {waiting:?} are blocked with nothing in flight for them")]
    Deadlock {
        /// Unfinished processes.
        waiting: Vec<ProcessId>,
    },

    /// The run did not finish within the step bound.
    #[error("run did not finish within {0} steps")]
    StepLimit(usize),
}

/// One simulated run.
pub struct Simulation {
    topology: Topology,
    processes: Vec<Box<dyn Process + Send>>,
    network: SimNetwork,
    rng: ChaCha8Rng,
    inside: BTreeSet<ProcessId>,
    requests: BTreeMap<ProcessId, Request>,
    max_steps: usize,
    trace: Trace,
}

impl Simulation {
    /// Mesh of `topology` running `protocol`, scheduled by `seed`.
    pub fn new(topology: Topology, protocol: &Protocol, seed: u64) -> Result<Self, SimError> {
        let processes = protocol.build_all(topology).map_err(SimError::Setup)?;
        Ok(Self {
            topology,
            processes,
            network: SimNetwork::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            inside: BTreeSet::new(),
            requests: BTreeMap::new(),
            max_steps: DEFAULT_MAX_STEPS,
            trace: Trace::default(),
        })
    }

    /// Give up after `max_steps` scheduler steps.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Run every process to completion.
    ///
    /// # Errors
    ///
    /// The first protocol violation, a deadlock, or the step bound.
    pub fn run(mut self) -> Result<Trace, SimError> {
        for id in self.topology.processes() {
            let actions = self.with_process(id, |process| process.start())?;
            self.execute(id, actions)?;
        }
        self.observe_critical_sections();

        while self.trace.steps < self.max_steps {
            let runnable = self.runnable();
            let Some(&id) = runnable.choose(&mut self.rng) else {
                let waiting = self.unfinished();
                if waiting.is_empty() {
                    return Ok(self.finish());
                }
                return Err(SimError::Deadlock { waiting });
            };

            self.trace.steps += 1;
            self.step(id)?;
            self.observe_critical_sections();
        }

        Err(SimError::StepLimit(self.max_steps))
    }

    fn runnable(&self) -> Vec<ProcessId> {
        self.processes
            .iter()
            .filter(|process| match process.next_step() {
                Step::Receive(Source::From(peer)) => self.network.has_pending(peer, process.id()),
                Step::Receive(Source::Any) => !self.network.senders_to(process.id()).is_empty(),
                Step::CriticalSection => true,
                Step::Finished => false,
            })
            .map(|process| process.id())
            .collect()
    }

    fn unfinished(&self) -> Vec<ProcessId> {
        self.processes
            .iter()
            .filter(|process| process.next_step() != Step::Finished)
            .map(|process| process.id())
            .collect()
    }

    fn step(&mut self, id: ProcessId) -> Result<(), SimError> {
        let step = self.with_process(id, |process| Ok(process.next_step()))?;
        match step {
            Step::Receive(Source::From(peer)) => self.deliver(peer, id),
            Step::Receive(Source::Any) => {
                let senders = self.network.senders_to(id);
                let Some(&from) = senders.choose(&mut self.rng) else {
                    return Err(SimError::Deadlock { waiting: vec![id] });
                };
                self.deliver(from, id)
            },
            Step::CriticalSection => {
                trace!(id, "leaving critical section");
                let actions = self.with_process(id, |process| process.leave_critical_section())?;
                self.inside.remove(&id);
                self.trace.entries.push(TraceEntry::Left { id });
                self.execute(id, actions)
            },
            Step::Finished => Ok(()),
        }
    }

    fn deliver(&mut self, from: ProcessId, to: ProcessId) -> Result<(), SimError> {
        let Some(message) = self.network.pop(from, to) else {
            return Err(SimError::Deadlock { waiting: vec![to] });
        };
        let kind = message.message_type()?;
        debug!(from, to, %kind, timestamp = message.timestamp(), "deliver");

        let clock_before = self.with_process(to, |process| Ok(process.snapshot().clock))?;
        let actions = self.with_process(to, |process| process.handle(from, &message))?;
        let clock_after = self.with_process(to, |process| Ok(process.snapshot().clock))?;

        self.trace.entries.push(TraceEntry::Delivered {
            from,
            to,
            kind,
            timestamp: message.timestamp(),
            clock_before,
            clock_after,
        });
        self.execute(to, actions)
    }

    fn execute(&mut self, id: ProcessId, actions: Vec<Action>) -> Result<(), SimError> {
        for action in actions {
            match action {
                Action::Send { to, message } => self.send(id, to, message)?,
                Action::Multicast { message } => {
                    for to in self.topology.peers_of(id) {
                        self.send(id, to, message.clone())?;
                    }
                },
                Action::Log(event) => self.trace.events.push(event),
                Action::Publish(report) => self.trace.report = Some(report),
            }
        }
        Ok(())
    }

    fn send(&mut self, from: ProcessId, to: ProcessId, message: Message) -> Result<(), SimError> {
        let kind = message.message_type()?;
        let timestamp = message.timestamp();
        if kind == MessageType::CsRequest {
            self.requests.insert(from, Request { timestamp, id: from });
        }

        self.trace.entries.push(TraceEntry::Sent { from, to, kind, timestamp });
        self.network.push(from, to, message);
        Ok(())
    }

    fn observe_critical_sections(&mut self) {
        for process in &self.processes {
            let id = process.id();
            if process.next_step() == Step::CriticalSection && self.inside.insert(id) {
                trace!(id, "entered critical section");
                let request = self.requests.get(&id).copied();
                self.trace.entries.push(TraceEntry::Entered { id, request });
            }
        }
    }

    fn with_process<T>(
        &mut self,
        id: ProcessId,
        f: impl FnOnce(&mut dyn Process) -> Result<T, CoreError>,
    ) -> Result<T, SimError> {
        let process = self
            .processes
            .get_mut(usize::from(id))
            .ok_or(SimError::Setup(CoreError::UnknownProcess(id)))?;
        f(process.as_mut()).map_err(|source| SimError::Process { id, source })
    }

    fn finish(mut self) -> Trace {
        debug!(steps = self.trace.steps, in_flight = self.network.in_flight(), "run finished");
        self.trace.snapshots = self.processes.iter().map(|process| process.snapshot()).collect();
        self.trace
    }
}

#[cfg(test)]
mod tests {
    use lamport_core::Iterations;
    use lamport_proto::TransferOrder;

    use super::*;

    fn topology(workers: usize) -> Topology {
        Topology::new(workers).unwrap()
    }

    #[test]
    fn loop_run_finishes_every_process() {
        let protocol = Protocol::Loop { mutexl: true, iterations: Iterations::Fixed(2) };
        let trace = Simulation::new(topology(3), &protocol, 7).unwrap().run().unwrap();

        assert!(trace.snapshots().iter().all(|snapshot| snapshot.finished));
        assert_eq!(trace.cs_entries().count(), 6);
    }

    #[test]
    fn same_seed_replays_the_same_run() {
        let protocol = Protocol::Loop { mutexl: true, iterations: Iterations::Fixed(3) };
        let first = Simulation::new(topology(3), &protocol, 42).unwrap().run().unwrap();
        let second = Simulation::new(topology(3), &protocol, 42).unwrap().run().unwrap();

        assert_eq!(first.entries(), second.entries());
        assert_eq!(first.lines(), second.lines());
    }

    #[test]
    fn ledger_run_publishes_report() {
        let protocol = Protocol::Ledger {
            balances: vec![10, 20, 30],
            transfers: vec![TransferOrder { src: 1, dst: 2, amount: 5 }],
        };
        let trace = Simulation::new(topology(3), &protocol, 1).unwrap().run().unwrap();

        let report = trace.report().unwrap();
        assert_eq!(report.final_balances(), vec![(1, 5), (2, 25), (3, 30)]);
        assert_eq!(trace.snapshot(2).unwrap().balance, Some(25));
    }

    #[test]
    fn step_limit_stops_the_run() {
        let protocol = Protocol::Loop { mutexl: true, iterations: Iterations::Fixed(5) };
        let result = Simulation::new(topology(3), &protocol, 0).unwrap().with_max_steps(3).run();

        assert!(matches!(result, Err(SimError::StepLimit(3))));
    }
}
