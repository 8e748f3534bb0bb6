use std::collections::VecDeque;

use lamport_proto::{
    Balance, BalanceHistory, COORDINATOR, Message, MessageType, Payload, ProcessId,
    TransferOrder,
};
use tracing::{debug, info};

use crate::{
    action::{Action, Source, Step},
    clock::LamportClock,
    error::CoreError,
    event::Event,
    ledger::{report::AllHistory, schedule::validate_order},
    process::{Process, ProcessSnapshot},
    sync::Barrier,
    topology::Topology,
};

#[derive(Debug)]
enum Phase {
    Startup(Barrier),
    Transferring(TransferOrder),
    Stopping(Barrier),
    Collecting(Barrier),
    Finished,
}

/// Coordinator of the ledger variant.
///
/// ```text
/// Startup ─> Transferring ─(last ACK)─> Stopping ─(all DONE)─> Collecting ─> Finished
///              ↺ one order in flight        STOP sent         histories in
/// ```
///
/// Every wait reads a single worker's channel: the ACK of the current order
/// comes from its destination, DONE and BALANCE_HISTORY from each worker in
/// id order. No other traffic reaches the coordinator in between.
#[derive(Debug)]
pub struct LedgerCoordinator {
    topology: Topology,
    clock: LamportClock,
    total: i64,
    schedule: VecDeque<TransferOrder>,
    histories: Vec<BalanceHistory>,
    phase: Phase,
}

impl LedgerCoordinator {
    /// Coordinator running `schedule` over workers holding `balances`
    /// (index `i` belongs to worker `i + 1`).
    ///
    /// # Errors
    ///
    /// - `BalanceCount` if there is not exactly one balance per worker
    /// - `InvalidTransfer` for the first order that cannot run
    pub fn new(
        topology: Topology,
        balances: &[Balance],
        schedule: impl IntoIterator<Item = TransferOrder>,
    ) -> Result<Self, CoreError> {
        if balances.len() != topology.worker_count() {
            return Err(CoreError::BalanceCount {
                expected: topology.worker_count(),
                got: balances.len(),
            });
        }
        let schedule: VecDeque<_> = schedule.into_iter().collect();
        for order in &schedule {
            validate_order(topology, *order)?;
        }

        Ok(Self {
            topology,
            clock: LamportClock::new(),
            total: balances.iter().copied().map(i64::from).sum(),
            schedule,
            histories: Vec::with_capacity(topology.worker_count()),
            phase: Phase::Startup(Barrier::new(MessageType::Started, topology.workers())),
        })
    }

    /// Orders not yet issued.
    pub fn remaining(&self) -> usize {
        self.schedule.len()
    }

    fn next_order(&mut self, actions: &mut Vec<Action>) -> Result<(), CoreError> {
        match self.schedule.pop_front() {
            Some(order) => {
                let message = self.clock.stamp(&Payload::Transfer(order))?;
                debug!(?order, time = message.timestamp(), "issuing transfer");
                actions.push(Action::Send { to: order.src, message });
                self.phase = Phase::Transferring(order);
            },
            None => {
                let message = self.clock.stamp(&Payload::Stop)?;
                info!(time = message.timestamp(), "transfers complete, stopping workers");
                actions.push(Action::Multicast { message });
                self.phase =
                    Phase::Stopping(Barrier::new(MessageType::Done, self.topology.workers()));
            },
        }
        Ok(())
    }

    fn collect(&mut self, from: ProcessId, message: &Message) -> Result<(), CoreError> {
        let Payload::BalanceHistory(history) = message.payload()? else {
            return Err(CoreError::UnexpectedMessage {
                from,
                expected: MessageType::BalanceHistory,
                got: message.message_type()?,
            });
        };
        if history.id != from {
            return Err(CoreError::UnexpectedSender { expected: from, got: history.id });
        }
        self.histories.push(history);
        Ok(())
    }

    fn publish(&mut self, actions: &mut Vec<Action>) -> Result<(), CoreError> {
        let report = AllHistory::new(std::mem::take(&mut self.histories));
        report.verify(self.total)?;

        info!(
            final_time = report.final_time(),
            balances = ?report.final_balances(),
            "histories collected"
        );
        actions.push(Action::Publish(report));
        self.phase = Phase::Finished;
        Ok(())
    }

    fn phase_name(&self) -> &'static str {
        match self.phase {
            Phase::Startup(_) => "starting",
            Phase::Transferring(_) => "transferring",
            Phase::Stopping(_) => "stopping",
            Phase::Collecting(_) => "collecting histories",
            Phase::Finished => "finished",
        }
    }
}

impl Process for LedgerCoordinator {
    fn id(&self) -> ProcessId {
        COORDINATOR
    }

    fn start(&mut self) -> Result<Vec<Action>, CoreError> {
        Ok(Vec::new())
    }

    fn next_step(&self) -> Step {
        match &self.phase {
            Phase::Startup(barrier) | Phase::Stopping(barrier) | Phase::Collecting(barrier) => {
                Step::Receive(barrier.next_source().map_or(Source::Any, Source::From))
            },
            Phase::Transferring(order) => Step::Receive(Source::From(order.dst)),
            Phase::Finished => Step::Finished,
        }
    }

    fn handle(&mut self, from: ProcessId, message: &Message) -> Result<Vec<Action>, CoreError> {
        let time = self.clock.observe(message.timestamp())?;

        let mut actions = Vec::new();
        match &mut self.phase {
            Phase::Startup(barrier) => {
                barrier.record(from, message)?;
                if barrier.is_complete() {
                    info!("all workers started");
                    actions.push(Action::Log(Event::ReceivedAllStarted { time, id: COORDINATOR }));
                    self.next_order(&mut actions)?;
                }
            },
            Phase::Transferring(order) => {
                if from != order.dst {
                    return Err(CoreError::UnexpectedSender { expected: order.dst, got: from });
                }
                let got = message.message_type()?;
                if got != MessageType::Ack {
                    return Err(CoreError::UnexpectedMessage {
                        from,
                        expected: MessageType::Ack,
                        got,
                    });
                }
                self.next_order(&mut actions)?;
            },
            Phase::Stopping(barrier) => {
                barrier.record(from, message)?;
                if barrier.is_complete() {
                    info!("all workers done");
                    actions.push(Action::Log(Event::ReceivedAllDone { time, id: COORDINATOR }));
                    self.phase = Phase::Collecting(Barrier::new(
                        MessageType::BalanceHistory,
                        self.topology.workers(),
                    ));
                }
            },
            Phase::Collecting(barrier) => {
                barrier.record(from, message)?;
                let complete = barrier.is_complete();
                self.collect(from, message)?;
                if complete {
                    self.publish(&mut actions)?;
                }
            },
            Phase::Finished => {
                return Err(CoreError::InvalidState {
                    state: self.phase_name().to_owned(),
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
