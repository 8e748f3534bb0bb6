//! Spawns one thread per logical process and waits for all of them.

use std::{
    fs::File,
    io::{BufWriter, Write},
    sync::Arc,
    thread::{self, JoinHandle},
};

use lamport_proto::ProcessId;
use tracing::{error, info};

use crate::{
    abort::AbortFlag,
    config::RunConfig,
    driver::drive,
    error::{ProcessError, RunError},
    event_log::EventSink,
    topology::EndpointTable,
};

/// Raises the abort flag if the owning thread unwinds.
struct RaiseOnPanic(AbortFlag);

impl Drop for RaiseOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.raise();
        }
    }
}

struct Outcome {
    result: Result<(), ProcessError>,
    root_cause: bool,
}

/// Run every process of `config` to completion.
///
/// The first process to fail raises the run-wide abort flag; the others
/// stop at their next blocked send or receive. Every thread is joined
/// before returning.
///
/// # Errors
///
/// The failure of the process that failed first. Failures caused only by
/// the teardown are not reported.
pub fn run(config: &RunConfig, sink: Arc<dyn EventSink>) -> Result<(), RunError> {
    let topology = config.topology;
    let programs = config.protocol.build_all(topology)?;

    let abort = AbortFlag::new();
    let mut pipes_log = BufWriter::new(File::create(&config.logs.pipes)?);
    let meshes = EndpointTable::build(topology, &abort, &mut pipes_log)?;
    pipes_log.flush()?;
    drop(pipes_log);

    info!(workers = topology.worker_count(), protocol = ?config.protocol, "starting mesh");

    let mut handles: Vec<(ProcessId, JoinHandle<Outcome>)> = Vec::with_capacity(meshes.len());
    for (mut program, mut mesh) in programs.into_iter().zip(meshes) {
        let id = program.id();
        let abort = abort.clone();
        let sink = Arc::clone(&sink);
        let thread_abort = abort.clone();

        let spawned = thread::Builder::new().name(format!("process-{id}")).spawn(move || {
            let abort = thread_abort;
            let _guard = RaiseOnPanic(abort.clone());
            let result = drive(program.as_mut(), &mut mesh, sink.as_ref());
            let root_cause = match &result {
                Err(e) if abort.raise() => {
                    error!(id, error = %e, "process failed");
                    true
                },
                _ => false,
            };
            mesh.close();
            Outcome { result, root_cause }
        });

        match spawned {
            Ok(handle) => handles.push((id, handle)),
            Err(e) => {
                abort.raise();
                join_all(handles);
                return Err(RunError::Io(e));
            },
        }
    }

    match join_all(handles) {
        Some(failure) => Err(failure),
        None => {
            info!("all processes finished");
            Ok(())
        },
    }
}

fn join_all(handles: Vec<(ProcessId, JoinHandle<Outcome>)>) -> Option<RunError> {
    let mut root = None;
    let mut first = None;

    for (id, handle) in handles {
        let failure = match handle.join() {
            Ok(Outcome { result: Ok(()), .. }) => continue,
            Ok(Outcome { result: Err(source), root_cause }) => {
                let failure = RunError::Process { id, source };
                if root_cause {
                    root = Some(failure);
                    continue;
                }
                failure
            },
            Err(_) => RunError::Panicked { id },
        };
        let secondary = matches!(&failure, RunError::Process { source, .. } if source.is_aborted());
        if first.is_none() && !secondary {
            first = Some(failure);
        }
    }
    root.or(first)
}
