//! Scenario builder API.

use lamport_core::{Iterations, Protocol, Topology};
use lamport_proto::{Balance, TransferOrder};

use crate::{
    scenario::{OracleFn, World},
    sim::{DEFAULT_MAX_STEPS, Simulation},
};

/// Scenario builder.
///
/// Defaults to three workers running the loop protocol without mutual
/// exclusion, seed 0. Call `.oracle()` to get something that can run.
pub struct Scenario {
    name: String,
    workers: usize,
    protocol: Protocol,
    seed: u64,
    max_steps: usize,
}

impl Scenario {
    /// Create a new scenario with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workers: 3,
            protocol: Protocol::Loop { mutexl: false, iterations: Iterations::default() },
            seed: 0,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Number of workers, coordinator excluded.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Run the loop protocol.
    pub fn loop_workload(mut self, mutexl: bool, iterations: Iterations) -> Self {
        self.protocol = Protocol::Loop { mutexl, iterations };
        self
    }

    /// Run the ledger protocol.
    pub fn ledger(mut self, balances: Vec<Balance>, transfers: Vec<TransferOrder>) -> Self {
        self.protocol = Protocol::Ledger { balances, transfers };
        self
    }

    /// Scheduler seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Step bound for the simulation.
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory: a scenario cannot run without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Simulate the mesh to completion, then run the oracle on the result.
    pub fn run(self) -> Result<(), String> {
        let Scenario { name, workers, protocol, seed, max_steps } = self.scenario;

        let topology =
            Topology::new(workers).map_err(|e| format!("Scenario '{name}': {e}"))?;
        let trace = Simulation::new(topology, &protocol, seed)
            .and_then(|simulation| simulation.with_max_steps(max_steps).run())
            .map_err(|e| format!("Scenario '{name}' (seed {seed}): {e}"))?;

        let world = World::new(name, topology, protocol, seed, trace);
        (self.oracle)(&world)
    }
}
