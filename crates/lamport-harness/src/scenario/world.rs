//! Final state of a scenario run.

use lamport_core::{Protocol, Topology};

use crate::trace::Trace;

/// Everything an oracle may inspect after a run.
pub struct World {
    name: String,
    topology: Topology,
    protocol: Protocol,
    seed: u64,
    trace: Trace,
}

impl World {
    pub(crate) fn new(
        name: String,
        topology: Topology,
        protocol: Protocol,
        seed: u64,
        trace: Trace,
    ) -> Self {
        Self { name, topology, protocol, seed, trace }
    }

    /// Scenario name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mesh shape.
    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Protocol every process ran.
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Scheduler seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// What the run did.
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Prefix for oracle failures.
    pub fn context(&self) -> String {
        format!("Scenario '{}' (seed {})", self.name, self.seed)
    }
}
