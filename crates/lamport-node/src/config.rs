//! Command line and run configuration.

use std::path::PathBuf;

use clap::Parser;
use lamport_core::{
    Iterations, Protocol, Topology,
    ledger::{ring_schedule, validate_order},
};
use lamport_proto::{Balance, MAX_WORKERS, TransferOrder};

use crate::error::ConfigError;

/// Lamport mesh testbed: N workers and a coordinator exchanging framed
/// messages over a full mesh of local channels.
#[derive(Debug, Clone, Parser)]
#[command(name = "lamport-node", version, about, long_about = None)]
pub struct Cli {
    /// Number of worker processes
    #[arg(short = 'p', long = "processes", value_name = "N")]
    pub processes: usize,

    /// Initial balance of each worker; selects the ledger protocol
    #[arg(value_name = "BALANCE")]
    pub balances: Vec<Balance>,

    /// Guard every loop iteration with distributed mutual exclusion
    #[arg(long)]
    pub mutexl: bool,

    /// Loop iterations per worker (default: 5 × worker id)
    #[arg(long, value_name = "K")]
    pub iterations: Option<u32>,

    /// Transfer order, repeatable; replaces the default ring schedule
    #[arg(long = "transfer", value_name = "SRC:DST:AMOUNT", value_parser = parse_transfer)]
    pub transfers: Vec<TransferOrder>,

    /// Event log file, appended to
    #[arg(long, value_name = "PATH", default_value = "events.log")]
    pub events_log: PathBuf,

    /// Channel log file, truncated
    #[arg(long, value_name = "PATH", default_value = "pipes.log")]
    pub pipes_log: PathBuf,
}

/// Where the run writes its logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    /// Event log, appended to.
    pub events: PathBuf,
    /// Channel log, truncated.
    pub pipes: PathBuf,
}

/// Validated configuration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Mesh shape.
    pub topology: Topology,
    /// Protocol every process runs.
    pub protocol: Protocol,
    /// Log destinations.
    pub logs: LogPaths,
}

impl TryFrom<Cli> for RunConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let topology = Topology::new(cli.processes)
            .map_err(|_| ConfigError::Workers { got: cli.processes, max: MAX_WORKERS })?;

        let protocol = if cli.balances.is_empty() {
            if !cli.transfers.is_empty() {
                return Err(ConfigError::Conflict("--transfer needs initial balances"));
            }
            Protocol::Loop {
                mutexl: cli.mutexl,
                iterations: cli.iterations.map_or_else(Iterations::default, Iterations::Fixed),
            }
        } else {
            if cli.mutexl || cli.iterations.is_some() {
                return Err(ConfigError::Conflict(
                    "--mutexl and --iterations do not apply to the ledger protocol",
                ));
            }
            if cli.balances.len() != topology.worker_count() {
                return Err(ConfigError::BalanceCount {
                    expected: topology.worker_count(),
                    got: cli.balances.len(),
                });
            }
            let transfers =
                if cli.transfers.is_empty() { ring_schedule(topology) } else { cli.transfers };
            for order in &transfers {
                validate_order(topology, *order).map_err(ConfigError::Transfer)?;
            }
            Protocol::Ledger { balances: cli.balances, transfers }
        };

        Ok(Self {
            topology,
            protocol,
            logs: LogPaths { events: cli.events_log, pipes: cli.pipes_log },
        })
    }
}

fn parse_transfer(value: &str) -> Result<TransferOrder, String> {
    let parts: Vec<_> = value.split(':').collect();
    let [src, dst, amount] = parts.as_slice() else {
        return Err(format!("expected SRC:DST:AMOUNT, got {value:?}"));
    };
    Ok(TransferOrder {
        src: src.parse().map_err(|e| format!("bad source {src:?}: {e}"))?,
        dst: dst.parse().map_err(|e| format!("bad destination {dst:?}: {e}"))?,
        amount: amount.parse().map_err(|e| format!("bad amount {amount:?}: {e}"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<RunConfig, ConfigError> {
        let cli = Cli::try_parse_from(std::iter::once("lamport-node").chain(args.iter().copied()))
            .unwrap();
        RunConfig::try_from(cli)
    }

    #[test]
    fn loop_defaults() {
        let config = parse(&["-p", "3"]).unwrap();

        assert_eq!(config.topology.worker_count(), 3);
        assert_eq!(
            config.protocol,
            Protocol::Loop { mutexl: false, iterations: Iterations::PerId(5) }
        );
        assert_eq!(config.logs.events, PathBuf::from("events.log"));
        assert_eq!(config.logs.pipes, PathBuf::from("pipes.log"));
    }

    #[test]
    fn loop_with_mutex() {
        let config = parse(&["-p", "2", "--mutexl", "--iterations", "4"]).unwrap();

        assert_eq!(config.protocol, Protocol::Loop { mutexl: true, iterations: Iterations::Fixed(4) });
    }

    #[test]
    fn ledger_with_default_ring() {
        let config = parse(&["-p", "3", "10", "20", "30"]).unwrap();

        let Protocol::Ledger { balances, transfers } = config.protocol else {
            panic!("expected the ledger protocol");
        };
        assert_eq!(balances, vec![10, 20, 30]);
        assert_eq!(transfers, ring_schedule(config.topology));
    }

    #[test]
    fn ledger_with_explicit_transfers() {
        let config = parse(&["-p", "3", "--transfer", "1:2:5", "10", "20", "30"]).unwrap();

        assert_eq!(
            config.protocol,
            Protocol::Ledger {
                balances: vec![10, 20, 30],
                transfers: vec![TransferOrder { src: 1, dst: 2, amount: 5 }],
            }
        );
    }

    #[test]
    fn rejects_bad_worker_count() {
        assert!(matches!(parse(&["-p", "0"]), Err(ConfigError::Workers { got: 0, .. })));
        assert!(matches!(parse(&["-p", "16"]), Err(ConfigError::Workers { got: 16, max: 15 })));
    }

    #[test]
    fn rejects_balance_mismatch() {
        assert!(matches!(
            parse(&["-p", "3", "10", "20"]),
            Err(ConfigError::BalanceCount { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn rejects_conflicting_modes() {
        assert!(matches!(parse(&["-p", "2", "--mutexl", "1", "2"]), Err(ConfigError::Conflict(_))));
        assert!(matches!(parse(&["-p", "2", "--transfer", "1:2:1"]), Err(ConfigError::Conflict(_))));
    }

    #[test]
    fn rejects_invalid_transfer() {
        assert!(matches!(
            parse(&["-p", "2", "--transfer", "1:1:5", "1", "2"]),
            Err(ConfigError::Transfer(_))
        ));
    }

    #[test]
    fn transfer_syntax() {
        assert_eq!(parse_transfer("3:1:7"), Ok(TransferOrder { src: 3, dst: 1, amount: 7 }));
        assert!(parse_transfer("3:1").is_err());
        assert!(parse_transfer("a:1:7").is_err());
        assert!(
            Cli::try_parse_from(["lamport-node", "-p", "2", "--transfer", "1-2-3"]).is_err()
        );
    }
}
