//! Run configuration: which program every process executes.
//!
//! Exactly one protocol runs per mesh. The loop variant and the ledger
//! variant never share a run.

use lamport_proto::{Balance, COORDINATOR, ProcessId, TransferOrder};

use crate::{
    error::CoreError,
    ledger::{LedgerCoordinator, LedgerWorker},
    process::Process,
    topology::Topology,
    workload::{LoopCoordinator, LoopWorker},
};

/// Number of loop operations per worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iterations {
    /// `id × n` iterations for worker `id`.
    PerId(u32),
    /// The same count for every worker.
    Fixed(u32),
}

impl Iterations {
    /// Iterations worker `id` performs.
    pub fn count_for(self, id: ProcessId) -> u32 {
        match self {
            Self::PerId(factor) => u32::from(id).saturating_mul(factor),
            Self::Fixed(count) => count,
        }
    }
}

impl Default for Iterations {
    fn default() -> Self {
        Self::PerId(5)
    }
}

/// Protocol a mesh runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    /// Loop operations, optionally under distributed mutual exclusion.
    Loop {
        /// Guard every iteration with the critical section.
        mutexl: bool,
        /// Iterations per worker.
        iterations: Iterations,
    },
    /// Funds transfers with balance history.
    Ledger {
        /// Initial balance of worker `i + 1` at index `i`.
        balances: Vec<Balance>,
        /// Orders the coordinator issues, in sequence.
        transfers: Vec<TransferOrder>,
    },
}

impl Protocol {
    /// Program for process `id` of `topology`.
    ///
    /// # Errors
    ///
    /// `UnknownProcess` for an id outside the mesh, and whatever the
    /// program constructors reject.
    pub fn build(
        &self,
        topology: Topology,
        id: ProcessId,
    ) -> Result<Box<dyn Process + Send>, CoreError> {
        if !topology.contains(id) {
            return Err(CoreError::UnknownProcess(id));
        }

        Ok(match self {
            Self::Loop { .. } if id == COORDINATOR => Box::new(LoopCoordinator::new(topology)),
            Self::Loop { mutexl, iterations } => {
                Box::new(LoopWorker::new(topology, id, iterations.count_for(id), *mutexl)?)
            },
            Self::Ledger { balances, transfers } if id == COORDINATOR => {
                Box::new(LedgerCoordinator::new(topology, balances, transfers.iter().copied())?)
            },
            Self::Ledger { balances, .. } => {
                let balance = balances
                    .get(usize::from(id) - 1)
                    .copied()
                    .ok_or(CoreError::BalanceCount {
                        expected: topology.worker_count(),
                        got: balances.len(),
                    })?;
                Box::new(LedgerWorker::new(topology, id, balance)?)
            },
        })
    }

    /// Programs for every process, indexed by id.
    pub fn build_all(
        &self,
        topology: Topology,
    ) -> Result<Vec<Box<dyn Process + Send>>, CoreError> {
        topology.processes().map(|id| self.build(topology, id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Source, Step};

    #[test]
    fn iteration_counts() {
        assert_eq!(Iterations::default().count_for(3), 15);
        assert_eq!(Iterations::Fixed(2).count_for(3), 2);
    }

    #[test]
    fn builds_one_program_per_process() {
        let topology = Topology::new(3).unwrap();
        let protocol = Protocol::Loop { mutexl: true, iterations: Iterations::Fixed(1) };

        let programs = protocol.build_all(topology).unwrap();

        assert_eq!(programs.len(), 4);
        for (id, program) in programs.iter().enumerate() {
            assert_eq!(usize::from(program.id()), id);
        }
        assert_eq!(programs[0].next_step(), Step::Receive(Source::From(1)));
    }

    #[test]
    fn ledger_needs_a_balance_per_worker() {
        let topology = Topology::new(3).unwrap();
        let protocol = Protocol::Ledger { balances: vec![1, 2], transfers: Vec::new() };

        assert!(matches!(
            protocol.build(topology, 0),
            Err(CoreError::BalanceCount { expected: 3, got: 2 })
        ));
        assert!(matches!(
            protocol.build(topology, 3),
            Err(CoreError::BalanceCount { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn unknown_process() {
        let topology = Topology::new(1).unwrap();
        let protocol = Protocol::Loop { mutexl: false, iterations: Iterations::default() };

        assert!(matches!(protocol.build(topology, 2), Err(CoreError::UnknownProcess(2))));
    }
}
