//! Logical process ids of a full mesh.
//!
//! Process 0 is the coordinator, processes `1..=workers` are workers. Every
//! process has a directed channel to every other process; there are no
//! self-loops.

use lamport_proto::{COORDINATOR, MAX_WORKERS, ProcessId};

use crate::error::CoreError;

/// Shape of a mesh: one coordinator plus `workers` workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    workers: u8,
}

impl Topology {
    /// Mesh with `workers` workers.
    pub fn new(workers: usize) -> Result<Self, CoreError> {
        if workers == 0 || workers > MAX_WORKERS {
            return Err(CoreError::InvalidTopology { workers, max: MAX_WORKERS });
        }
        Ok(Self { workers: workers as u8 })
    }

    /// Number of workers.
    pub fn worker_count(&self) -> usize {
        usize::from(self.workers)
    }

    /// Number of processes, coordinator included.
    pub fn process_count(&self) -> usize {
        self.worker_count() + 1
    }

    /// Every process id, ascending.
    pub fn processes(&self) -> impl Iterator<Item = ProcessId> + use<> {
        COORDINATOR..=self.workers
    }

    /// Worker ids, ascending.
    pub fn workers(&self) -> impl Iterator<Item = ProcessId> + use<> {
        1..=self.workers
    }

    /// Every process except `id`, ascending.
    pub fn peers_of(&self, id: ProcessId) -> impl Iterator<Item = ProcessId> + use<> {
        self.processes().filter(move |peer| *peer != id)
    }

    /// Every worker except `id`, ascending.
    pub fn worker_peers_of(&self, id: ProcessId) -> impl Iterator<Item = ProcessId> + use<> {
        self.workers().filter(move |peer| *peer != id)
    }

    /// Whether `id` is part of this mesh.
    pub fn contains(&self, id: ProcessId) -> bool {
        id <= self.workers
    }

    /// Whether `id` is a worker of this mesh.
    pub fn is_worker(&self, id: ProcessId) -> bool {
        id != COORDINATOR && self.contains(id)
    }

    /// Fail with [`CoreError::UnknownProcess`] unless `id` is a worker.
    pub fn require_worker(&self, id: ProcessId) -> Result<(), CoreError> {
        if self.is_worker(id) { Ok(()) } else { Err(CoreError::UnknownProcess(id)) }
    }
}
