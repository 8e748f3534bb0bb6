use lamport_proto::{COORDINATOR, Message, MessageType, ProcessId};
use tracing::{debug, info};

use crate::{
    action::{Action, Source, Step},
    clock::LamportClock,
    error::CoreError,
    event::Event,
    process::{Process, ProcessSnapshot},
    sync::{Barrier, Quorum},
    topology::Topology,
};

#[derive(Debug)]
enum Phase {
    Startup(Barrier),
    Running(Quorum),
    Finished,
}

/// Coordinator of the loop variant.
///
/// Never sends. Waits for every worker's STARTED, then for every worker's
/// DONE. Workers multicast their critical-section traffic to the whole mesh,
/// so requests, replies and releases reach the coordinator too; they advance
/// its clock and are otherwise ignored.
#[derive(Debug)]
pub struct LoopCoordinator {
    topology: Topology,
    clock: LamportClock,
    phase: Phase,
}

impl LoopCoordinator {
    /// Coordinator for `topology`.
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            clock: LamportClock::new(),
            phase: Phase::Startup(Barrier::new(MessageType::Started, topology.workers())),
        }
    }
}

impl Process for LoopCoordinator {
    fn id(&self) -> ProcessId {
        COORDINATOR
    }

    fn start(&mut self) -> Result<Vec<Action>, CoreError> {
        Ok(Vec::new())
    }

    fn next_step(&self) -> Step {
        match &self.phase {
            Phase::Startup(barrier) => {
                Step::Receive(barrier.next_source().map_or(Source::Any, Source::From))
            },
            Phase::Running(_) => Step::Receive(Source::Any),
            Phase::Finished => Step::Finished,
        }
    }

    fn handle(&mut self, from: ProcessId, message: &Message) -> Result<Vec<Action>, CoreError> {
        self.clock.observe(message.timestamp())?;
        let kind = message.message_type()?;
        let time = self.clock.now();

        let mut actions = Vec::new();
        match &mut self.phase {
            Phase::Startup(barrier) => {
                barrier.record(from, message)?;
                if barrier.is_complete() {
                    info!("all workers started");
                    actions.push(Action::Log(Event::ReceivedAllStarted { time, id: COORDINATOR }));
                    self.phase =
                        Phase::Running(Quorum::new(MessageType::Done, self.topology.workers()));
                }
            },
            Phase::Running(done) => match kind {
                MessageType::Done => {
                    done.record(from, message)?;
                    if done.is_complete() {
                        info!("all workers done");
                        actions
                            .push(Action::Log(Event::ReceivedAllDone { time, id: COORDINATOR }));
                        self.phase = Phase::Finished;
                    }
                },
                _ if kind.is_critical_section() => {
                    debug!(from, %kind, time, "ignoring critical-section traffic");
                },
                got => {
                    return Err(CoreError::UnhandledMessage { from, got, phase: "running" });
                },
            },
            Phase::Finished => {
                return Err(CoreError::InvalidState {
                    state: String::from("finished"),
                    operation: "handle",
                });
            },
        }
        Ok(actions)
    }

    fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            id: COORDINATOR,
            clock: self.clock.now(),
            balance: None,
            mutex: None,
            finished: matches!(self.phase, Phase::Finished),
        }
    }
}

#[cfg(test)]
mod tests {
    use lamport_proto::Payload;

    use super::*;

    fn message(payload: &Payload, time: i16) -> Message {
        Message::new(payload, time).unwrap()
    }

    #[test]
    fn witnesses_start_and_done() {
        let mut coordinator = LoopCoordinator::new(Topology::new(2).unwrap());
        assert!(coordinator.start().unwrap().is_empty());
        assert_eq!(coordinator.next_step(), Step::Receive(Source::From(1)));

        coordinator.handle(1, &message(&Payload::Started(String::from("s1")), 1)).unwrap();
        assert_eq!(coordinator.next_step(), Step::Receive(Source::From(2)));

        let actions =
            coordinator.handle(2, &message(&Payload::Started(String::from("s2")), 1)).unwrap();
        assert_eq!(
            actions,
            vec![Action::Log(Event::ReceivedAllStarted { time: 3, id: COORDINATOR })]
        );
        assert_eq!(coordinator.next_step(), Step::Receive(Source::Any));

        coordinator.handle(2, &message(&Payload::CsRequest, 3)).unwrap();
        coordinator.handle(1, &message(&Payload::CsRelease, 8)).unwrap();
        coordinator.handle(2, &message(&Payload::Done(String::from("d2")), 9)).unwrap();
        let actions =
            coordinator.handle(1, &message(&Payload::Done(String::from("d1")), 10)).unwrap();

        assert_eq!(
            actions,
            vec![Action::Log(Event::ReceivedAllDone { time: 11, id: COORDINATOR })]
        );
        assert_eq!(coordinator.next_step(), Step::Finished);
        assert!(coordinator.snapshot().finished);
    }

    #[test]
    fn early_cs_traffic_breaks_startup() {
        let mut coordinator = LoopCoordinator::new(Topology::new(1).unwrap());

        assert_eq!(
            coordinator.handle(1, &message(&Payload::CsRequest, 2)),
            Err(CoreError::UnexpectedMessage {
                from: 1,
                expected: MessageType::Started,
                got: MessageType::CsRequest,
            })
        );
    }

    #[test]
    fn transfer_is_unhandled() {
        let mut coordinator = LoopCoordinator::new(Topology::new(1).unwrap());
        coordinator.handle(1, &message(&Payload::Started(String::new()), 1)).unwrap();

        assert_eq!(
            coordinator.handle(1, &message(&Payload::Ack, 3)),
            Err(CoreError::UnhandledMessage { from: 1, got: MessageType::Ack, phase: "running" })
        );
    }
}
