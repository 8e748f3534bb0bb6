//! `lamport-node` binary.
//!
//! Exit status: 0 on success, 1 when a process fails, 42 on an invalid
//! command line.

use std::{io, process::ExitCode, sync::Arc};

use clap::{Parser, error::ErrorKind};
use lamport_node::{Cli, EventLog, RunConfig, runner};
use tracing::error;
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 42;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            if let Err(io_err) = e.print() {
                error!(error = %io_err, "cannot write usage");
                return ExitCode::from(EXIT_FAILURE);
            }
            return ExitCode::from(parse_exit_status(e.kind()));
        },
    };

    let config = match RunConfig::try_from(cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(EXIT_USAGE);
        },
    };

    let sink = match EventLog::open(&config.logs.events) {
        Ok(log) => Arc::new(log),
        Err(e) => {
            error!(path = %config.logs.events.display(), error = %e, "cannot open event log");
            return ExitCode::from(EXIT_FAILURE);
        },
    };

    match runner::run(&config, sink) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::from(EXIT_FAILURE)
        },
    }
}

/// Help and version requests succeed; every other parse error is a usage error.
fn parse_exit_status(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => EXIT_USAGE,
    }
}
