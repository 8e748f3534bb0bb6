use lamport_proto::{
    Balance, COORDINATOR, Message, MessageType, Payload, ProcessId, Timestamp, TransferOrder,
};
use tracing::{debug, info};

use crate::{
    action::{Action, Source, Step},
    clock::LamportClock,
    error::CoreError,
    event::Event,
    ledger::{history::HistoryRecorder, schedule::validate_order},
    process::{Process, ProcessSnapshot},
    sync::{Barrier, Quorum},
    topology::Topology,
};

#[derive(Debug)]
enum Phase {
    Startup(Barrier),
    Serving,
    Stopped,
    Finished,
}

/// Worker of the ledger variant: one account.
///
/// As the source of an order it debits at the tick it forwards the order,
/// without waiting for the destination. As the destination it credits on
/// receipt, marks the amount as pending for the ticks it spent in flight,
/// and acknowledges to the coordinator.
#[derive(Debug)]
pub struct LedgerWorker {
    id: ProcessId,
    topology: Topology,
    clock: LamportClock,
    balance: Balance,
    history: HistoryRecorder,
    done: Quorum,
    phase: Phase,
}

impl LedgerWorker {
    /// Worker `id` holding `balance`.
    pub fn new(topology: Topology, id: ProcessId, balance: Balance) -> Result<Self, CoreError> {
        topology.require_worker(id)?;

        Ok(Self {
            id,
            topology,
            clock: LamportClock::new(),
            balance,
            history: HistoryRecorder::new(id, balance),
            done: Quorum::new(MessageType::Done, topology.worker_peers_of(id)),
            phase: Phase::Startup(Barrier::new(
                MessageType::Started,
                topology.worker_peers_of(id),
            )),
        })
    }

    /// Current balance.
    pub fn balance(&self) -> Balance {
        self.balance
    }

    fn on_all_started(&mut self, actions: &mut Vec<Action>) {
        info!(id = self.id, "all workers started");
        let time = self.clock.now();
        actions.push(Action::Log(Event::ReceivedAllStarted { time, id: self.id }));
        self.phase = Phase::Serving;
    }

    fn on_transfer(
        &mut self,
        from: ProcessId,
        sent_at: Timestamp,
        order: TransferOrder,
        actions: &mut Vec<Action>,
    ) -> Result<(), CoreError> {
        validate_order(self.topology, order)?;

        if from == COORDINATOR && order.src == self.id && matches!(self.phase, Phase::Serving) {
            let forward = self.clock.stamp(&Payload::Transfer(order))?;
            let time = forward.timestamp();
            self.balance = self
                .balance
                .checked_sub(order.amount)
                .ok_or(CoreError::BalanceOverflow { id: self.id })?;
            self.history.record(time, self.balance)?;

            debug!(id = self.id, to = order.dst, amount = order.amount, time, "debited");
            actions.push(Action::Log(Event::TransferOut {
                time,
                id: self.id,
                to: order.dst,
                amount: order.amount,
            }));
            actions.push(Action::Send { to: order.dst, message: forward });
            return Ok(());
        }

        if from == order.src && order.dst == self.id {
            let time = self.clock.now();
            self.balance = self
                .balance
                .checked_add(order.amount)
                .ok_or(CoreError::BalanceOverflow { id: self.id })?;
            self.history.record(time, self.balance)?;
            self.history.add_pending(sent_at, time, order.amount)?;

            debug!(id = self.id, from, amount = order.amount, time, "credited");
            actions.push(Action::Log(Event::TransferIn {
                time,
                id: self.id,
                from,
                amount: order.amount,
            }));
            let ack = self.clock.stamp(&Payload::Ack)?;
            actions.push(Action::Send { to: COORDINATOR, message: ack });
            return Ok(());
        }

        Err(CoreError::InvalidTransfer { order, reason: "not addressed to this worker" })
    }

    fn on_stop(&mut self, actions: &mut Vec<Action>) -> Result<(), CoreError> {
        let time = self.clock.tick()?;
        self.history.record(time, self.balance)?;
        let event = Event::Done { time, id: self.id, balance: Some(self.balance) };
        let message = Message::new(&Payload::Done(event.to_string()), time)?;

        info!(id = self.id, balance = self.balance, "stopped");
        actions.push(Action::Log(event));
        actions.push(Action::Multicast { message });
        self.phase = Phase::Stopped;
        self.finish_if_complete(actions)
    }

    /// Once stopped with every DONE seen, close the history and send it.
    /// The history ends at the tick before the BALANCE_HISTORY stamp.
    fn finish_if_complete(&mut self, actions: &mut Vec<Action>) -> Result<(), CoreError> {
        if !matches!(self.phase, Phase::Stopped) || !self.done.is_complete() {
            return Ok(());
        }

        let time = self.clock.now();
        info!(id = self.id, "all workers done");
        actions.push(Action::Log(Event::ReceivedAllDone { time, id: self.id }));

        let history = self.history.finish(time, self.balance)?;
        let message = self.clock.stamp(&Payload::BalanceHistory(history))?;
        actions.push(Action::Send { to: COORDINATOR, message });
        self.phase = Phase::Finished;
        Ok(())
    }

    fn phase_name(&self) -> &'static str {
        match self.phase {
            Phase::Startup(_) => "starting",
            Phase::Serving => "serving transfers",
            Phase::Stopped => "stopped",
            Phase::Finished => "finished",
        }
    }
}

impl Process for LedgerWorker {
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
        self.history.record(time, self.balance)?;
        let event = Event::Started { time, id: self.id, balance: Some(self.balance) };
        let message = Message::new(&Payload::Started(event.to_string()), time)?;
        let mut actions = vec![Action::Log(event), Action::Multicast { message }];

        if started_everyone {
            self.on_all_started(&mut actions);
        }
        Ok(actions)
    }

    fn next_step(&self) -> Step {
        match &self.phase {
            Phase::Startup(barrier) => {
                Step::Receive(barrier.next_source().map_or(Source::Any, Source::From))
            },
            Phase::Serving | Phase::Stopped => Step::Receive(Source::Any),
            Phase::Finished => Step::Finished,
        }
    }

    fn handle(&mut self, from: ProcessId, message: &Message) -> Result<Vec<Action>, CoreError> {
        let time = self.clock.observe(message.timestamp())?;
        self.history.record(time, self.balance)?;
        let kind = message.message_type()?;

        let mut actions = Vec::new();
        match (&mut self.phase, kind) {
            (Phase::Startup(barrier), _) => {
                barrier.record(from, message)?;
                if barrier.is_complete() {
                    self.on_all_started(&mut actions);
                }
            },
            (Phase::Serving | Phase::Stopped, MessageType::Transfer) => {
                let Payload::Transfer(order) = message.payload()? else {
                    return Err(CoreError::UnhandledMessage { from, got: kind, phase: "ledger" });
                };
                self.on_transfer(from, message.timestamp(), order, &mut actions)?;
            },
            (Phase::Serving, MessageType::Stop) if from == COORDINATOR => {
                self.on_stop(&mut actions)?;
            },
            (Phase::Serving | Phase::Stopped, MessageType::Done) => {
                self.done.record(from, message)?;
                self.finish_if_complete(&mut actions)?;
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

    fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            id: self.id,
            clock: self.clock.now(),
            balance: Some(self.balance),
            mutex: None,
            finished: matches!(self.phase, Phase::Finished),
        }
    }
}
