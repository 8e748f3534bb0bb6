use lamport_proto::{Message, MessageType, Payload, ProcessId};
use tracing::{debug, info};

use crate::{
    action::{Action, Source, Step},
    clock::LamportClock,
    error::CoreError,
    event::Event,
    mutex::{MutexEngine, MutexState},
    process::{Process, ProcessSnapshot},
    sync::{Barrier, Quorum},
    topology::Topology,
};

#[derive(Debug)]
enum Phase {
    Startup(Barrier),
    Working,
    Shutdown,
    Finished,
}

/// Worker of the loop variant.
///
/// ```text
/// Startup ──all STARTED──> Working ──last iteration──> Shutdown ──all DONE──> Finished
/// ```
///
/// Peers' DONE messages are counted from `Working` on, since a faster
/// worker may finish before we do. Critical-section traffic is serviced in
/// every phase after startup; a worker that has finished its own loop still
/// owes replies to the others.
#[derive(Debug)]
pub struct LoopWorker {
    id: ProcessId,
    clock: LamportClock,
    mutex: Option<MutexEngine>,
    iterations: u32,
    completed: u32,
    done: Quorum,
    phase: Phase,
}

impl LoopWorker {
    /// Worker `id` performing `iterations` loop operations, inside the
    /// critical section when `mutexl` is set.
    pub fn new(
        topology: Topology,
        id: ProcessId,
        iterations: u32,
        mutexl: bool,
    ) -> Result<Self, CoreError> {
        topology.require_worker(id)?;

        Ok(Self {
            id,
            clock: LamportClock::new(),
            mutex: mutexl.then(|| MutexEngine::new(id, topology.worker_peers_of(id))),
            iterations,
            completed: 0,
            done: Quorum::new(MessageType::Done, topology.worker_peers_of(id)),
            phase: Phase::Startup(Barrier::new(
                MessageType::Started,
                topology.worker_peers_of(id),
            )),
        })
    }

    /// Loop operations performed so far.
    pub fn completed(&self) -> u32 {
        self.completed
    }

    fn on_all_started(&mut self, actions: &mut Vec<Action>) -> Result<(), CoreError> {
        info!(id = self.id, "all workers started");
        let time = self.clock.now();
        actions.push(Action::Log(Event::ReceivedAllStarted { time, id: self.id }));
        self.phase = Phase::Working;
        self.next_iteration(actions)
    }

    fn next_iteration(&mut self, actions: &mut Vec<Action>) -> Result<(), CoreError> {
        if self.completed == self.iterations {
            return self.shut_down(actions);
        }

        match self.mutex.as_mut() {
            Some(mutex) => {
                let request = mutex.acquire(&mut self.clock)?;
                actions.push(Action::Multicast { message: request });
                mutex.try_enter();
                Ok(())
            },
            None => {
                while self.completed < self.iterations {
                    self.log_iteration(actions);
                }
                self.shut_down(actions)
            },
        }
    }

    fn log_iteration(&mut self, actions: &mut Vec<Action>) {
        self.completed += 1;
        actions.push(Action::Log(Event::LoopOperation {
            time: self.clock.now(),
            id: self.id,
            iteration: self.completed,
            total: self.iterations,
        }));
    }

    fn shut_down(&mut self, actions: &mut Vec<Action>) -> Result<(), CoreError> {
        let time = self.clock.tick()?;
        let event = Event::Done { time, id: self.id, balance: None };
        let message = Message::new(&Payload::Done(event.to_string()), time)?;

        info!(id = self.id, iterations = self.completed, "work done");
        actions.push(Action::Log(event));
        actions.push(Action::Multicast { message });
        self.phase = Phase::Shutdown;
        self.finish_if_complete(actions);
        Ok(())
    }

    fn finish_if_complete(&mut self, actions: &mut Vec<Action>) {
        if matches!(self.phase, Phase::Shutdown) && self.done.is_complete() {
            info!(id = self.id, "all workers done");
            let time = self.clock.now();
            actions.push(Action::Log(Event::ReceivedAllDone { time, id: self.id }));
            self.phase = Phase::Finished;
        }
    }

    fn phase_name(&self) -> &'static str {
        match self.phase {
            Phase::Startup(_) => "starting",
            Phase::Working => "working",
            Phase::Shutdown => "shutting down",
            Phase::Finished => "finished",
        }
    }
}

impl Process for LoopWorker {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn start(&mut self) -> Result<Vec<Action>, CoreError> {
        let Phase::Startup(barrier) = &self.phase else {
            return Err(CoreError::InvalidState {
                state: self.phase_name().to_owned(),
                operation: "start",
            });
        };
        let started_everyone = barrier.is_complete();

        let time = self.clock.tick()?;
        let event = Event::Started { time, id: self.id, balance: None };
        let message = Message::new(&Payload::Started(event.to_string()), time)?;
        let mut actions = vec![Action::Log(event), Action::Multicast { message }];

        if started_everyone {
            self.on_all_started(&mut actions)?;
        }
        Ok(actions)
    }

    fn next_step(&self) -> Step {
        match &self.phase {
            Phase::Startup(barrier) => {
                Step::Receive(barrier.next_source().map_or(Source::Any, Source::From))
            },
            Phase::Working
                if self.mutex.as_ref().map(MutexEngine::state)
                    == Some(MutexState::InCriticalSection) =>
            {
                Step::CriticalSection
            },
            Phase::Working | Phase::Shutdown => Step::Receive(Source::Any),
            Phase::Finished => Step::Finished,
        }
    }

    fn handle(&mut self, from: ProcessId, message: &Message) -> Result<Vec<Action>, CoreError> {
        self.clock.observe(message.timestamp())?;
        let kind = message.message_type()?;
        debug!(id = self.id, from, %kind, time = self.clock.now(), "received");

        let mut actions = Vec::new();
        match (&mut self.phase, kind) {
            (Phase::Startup(barrier), _) => {
                barrier.record(from, message)?;
                if barrier.is_complete() {
                    self.on_all_started(&mut actions)?;
                }
            },
            (Phase::Working | Phase::Shutdown, MessageType::Done) => {
                self.done.record(from, message)?;
                self.finish_if_complete(&mut actions);
            },
            (
                Phase::Working | Phase::Shutdown,
                MessageType::CsRequest | MessageType::CsReply | MessageType::CsRelease,
            ) if self.mutex.is_some() => {
                if let Some(mutex) = self.mutex.as_mut() {
                    actions.extend(mutex.handle(&mut self.clock, from, message)?);
                    mutex.try_enter();
                }
            },
            (Phase::Finished, _) => {
                return Err(CoreError::InvalidState {
                    state: self.phase_name().to_owned(),
                    operation: "handle",
                });
            },
            (_, got) => {
                return Err(CoreError::UnhandledMessage { from, got, phase: self.phase_name() });
            },
        }
        Ok(actions)
    }

    fn leave_critical_section(&mut self) -> Result<Vec<Action>, CoreError> {
        if self.next_step() != Step::CriticalSection {
            return Err(CoreError::InvalidState {
                state: self.phase_name().to_owned(),
                operation: "leave_critical_section",
            });
        }

        let mut actions = Vec::new();
        self.log_iteration(&mut actions);
        if let Some(mutex) = self.mutex.as_mut() {
            let release = mutex.release(&mut self.clock)?;
            actions.push(Action::Multicast { message: release });
        }
        self.next_iteration(&mut actions)?;
        Ok(actions)
    }

    fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            id: self.id,
            clock: self.clock.now(),
            balance: None,
            mutex: self.mutex.as_ref().map(MutexEngine::state),
            finished: matches!(self.phase, Phase::Finished),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology(workers: usize) -> Topology {
        Topology::new(workers).unwrap()
    }

    fn started(from: ProcessId, time: i16) -> Message {
        let event = Event::Started { time, id: from, balance: None };
        Message::new(&Payload::Started(event.to_string()), time).unwrap()
    }

    fn done(from: ProcessId, time: i16) -> Message {
        let event = Event::Done { time, id: from, balance: None };
        Message::new(&Payload::Done(event.to_string()), time).unwrap()
    }

    fn logs(actions: &[Action]) -> Vec<String> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::Log(event) => Some(event.to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn start_multicasts_started_with_log_line() {
        let mut worker = LoopWorker::new(topology(2), 1, 1, false).unwrap();
        let actions = worker.start().unwrap();

        let [Action::Log(event), Action::Multicast { message }] = actions.as_slice() else {
            panic!("unexpected actions: {actions:?}");
        };
        assert_eq!(message.timestamp(), 1);
        assert_eq!(message.payload().unwrap(), Payload::Started(event.to_string()));
        assert_eq!(worker.next_step(), Step::Receive(Source::From(2)));
    }

    #[test]
    fn without_mutex_logs_every_iteration_then_done() {
        let mut worker = LoopWorker::new(topology(2), 1, 3, false).unwrap();
        worker.start().unwrap();

        let actions = worker.handle(2, &started(2, 1)).unwrap();
        insta::assert_snapshot!(logs(&actions).join("\n"), @r"
        2: process 1 received all STARTED messages
        2: process 1 is doing 1 iteration out of 3
        2: process 1 is doing 2 iteration out of 3
        2: process 1 is doing 3 iteration out of 3
        3: process 1 has DONE
        ");
        assert_eq!(worker.next_step(), Step::Receive(Source::Any));

        let actions = worker.handle(2, &done(2, 2)).unwrap();
        assert_eq!(logs(&actions), vec!["4: process 1 received all DONE messages"]);
        assert_eq!(worker.next_step(), Step::Finished);
    }

    #[test]
    fn single_worker_with_mutex_enters_without_replies() {
        let mut worker = LoopWorker::new(topology(1), 1, 2, true).unwrap();
        worker.start().unwrap();
        assert_eq!(worker.next_step(), Step::CriticalSection);

        worker.leave_critical_section().unwrap();
        assert_eq!(worker.next_step(), Step::CriticalSection);

        let actions = worker.leave_critical_section().unwrap();
        assert!(logs(&actions).iter().any(|line| line.ends_with("received all DONE messages")));
        assert_eq!(worker.next_step(), Step::Finished);
        assert_eq!(worker.completed(), 2);
    }

    #[test]
    fn mutex_waits_for_reply() {
        let mut worker = LoopWorker::new(topology(2), 1, 1, true).unwrap();
        worker.start().unwrap();

        let actions = worker.handle(2, &started(2, 1)).unwrap();
        assert!(actions.iter().any(|action| matches!(
            action,
            Action::Multicast { message } if message.message_type().unwrap() == MessageType::CsRequest
        )));
        assert_eq!(worker.next_step(), Step::Receive(Source::Any));

        let reply = Message::new(&Payload::CsReply, 5).unwrap();
        worker.handle(2, &reply).unwrap();
        assert_eq!(worker.next_step(), Step::CriticalSection);
    }

    #[test]
    fn early_done_is_counted() {
        let mut worker = LoopWorker::new(topology(2), 1, 1, true).unwrap();
        worker.start().unwrap();
        worker.handle(2, &started(2, 1)).unwrap();

        // Peer 2 already finished and left the queue.
        worker.handle(2, &Message::new(&Payload::CsReply, 4).unwrap()).unwrap();
        worker.handle(2, &done(2, 6)).unwrap();
        assert_eq!(worker.next_step(), Step::CriticalSection);

        worker.leave_critical_section().unwrap();
        assert_eq!(worker.next_step(), Step::Finished);
    }

    #[test]
    fn transfer_is_a_protocol_violation() {
        let mut worker = LoopWorker::new(topology(2), 1, 1, false).unwrap();
        worker.start().unwrap();
        worker.handle(2, &started(2, 1)).unwrap();

        let stop = Message::new(&Payload::Stop, 3).unwrap();
        assert_eq!(
            worker.handle(0, &stop),
            Err(CoreError::UnhandledMessage { from: 0, got: MessageType::Stop, phase: "shutting down" })
        );
    }

    #[test]
    fn coordinator_is_not_a_worker() {
        assert_eq!(LoopWorker::new(topology(2), 0, 1, false).unwrap_err(), CoreError::UnknownProcess(0));
    }
}
