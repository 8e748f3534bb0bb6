//! Reusable oracles.
//!
//! Each function returns an [`OracleFn`] checking one property of a
//! finished run. Combine them with [`all_of`].

use std::collections::BTreeMap;

use lamport_core::{Protocol, mutex::Request};
use lamport_proto::{Balance, COORDINATOR, MessageType, ProcessId, Timestamp};

use crate::{
    scenario::OracleFn,
    trace::TraceEntry,
};

/// Run every oracle, failing on the first failure.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world| oracles.iter().try_for_each(|oracle| oracle(world)))
}

/// Every process reached the end of its program.
pub fn all_finished() -> OracleFn {
    Box::new(|world| {
        let unfinished: Vec<_> = world
            .trace()
            .snapshots()
            .iter()
            .filter(|snapshot| !snapshot.finished)
            .map(|snapshot| snapshot.id)
            .collect();
        if unfinished.is_empty() {
            Ok(())
        } else {
            Err(format!("{}: processes {unfinished:?} did not finish", world.context()))
        }
    })
}

/// At most one process inside the critical section at any point.
pub fn mutual_exclusion() -> OracleFn {
    Box::new(|world| {
        let mut holder: Option<ProcessId> = None;
        for entry in world.trace().entries() {
            match entry {
                TraceEntry::Entered { id, .. } => {
                    if let Some(other) = holder {
                        return Err(format!(
                            "{}: process {id} entered while process {other} was inside",
                            world.context()
                        ));
                    }
                    holder = Some(*id);
                },
                TraceEntry::Left { id } if holder == Some(*id) => holder = None,
                TraceEntry::Left { id } => {
                    return Err(format!(
                        "{}: process {id} left a critical section it did not hold",
                        world.context()
                    ));
                },
                _ => {},
            }
        }
        Ok(())
    })
}

/// Critical sections are granted in ascending `(timestamp, id)` order.
pub fn request_order() -> OracleFn {
    Box::new(|world| {
        let mut previous: Option<Request> = None;
        for (id, request) in world.trace().cs_entries() {
            let Some(request) = request else {
                return Err(format!(
                    "{}: process {id} entered without a request on the wire",
                    world.context()
                ));
            };
            if previous.is_some_and(|previous| previous >= request) {
                return Err(format!(
                    "{}: {request:?} granted after {previous:?}",
                    world.context()
                ));
            }
            previous = Some(request);
        }
        Ok(())
    })
}

/// Every loop worker entered the critical section once per iteration
/// under mutual exclusion, and never without it.
pub fn every_acquire_enters() -> OracleFn {
    Box::new(|world| {
        let mut entries: BTreeMap<ProcessId, u32> = BTreeMap::new();
        for (id, _) in world.trace().cs_entries() {
            *entries.entry(id).or_default() += 1;
        }

        let expected = |id: ProcessId| match world.protocol() {
            Protocol::Loop { mutexl: true, iterations } => iterations.count_for(id),
            _ => 0,
        };
        for id in world.topology().workers() {
            let got = entries.get(&id).copied().unwrap_or(0);
            if got != expected(id) {
                return Err(format!(
                    "{}: process {id} entered {got} times, expected {}",
                    world.context(),
                    expected(id)
                ));
            }
        }
        Ok(())
    })
}

/// Every receive moves the clock past both the local value and the
/// message timestamp; no process sends with a decreasing timestamp.
pub fn clock_monotonicity() -> OracleFn {
    Box::new(|world| {
        let mut last_sent: BTreeMap<ProcessId, Timestamp> = BTreeMap::new();
        for entry in world.trace().entries() {
            match *entry {
                TraceEntry::Delivered { from, to, kind, timestamp, clock_before, clock_after } => {
                    if clock_after <= clock_before || clock_after <= timestamp {
                        return Err(format!(
                            "{}: process {to} moved its clock {clock_before} -> {clock_after} \
                             receiving {kind} stamped {timestamp} from {from}",
                            world.context()
                        ));
                    }
                },
                TraceEntry::Sent { from, timestamp, .. } => {
                    let last = last_sent.entry(from).or_insert(timestamp);
                    if timestamp < *last {
                        return Err(format!(
                            "{}: process {from} sent at {timestamp} after sending at {last}",
                            world.context()
                        ));
                    }
                    *last = timestamp;
                },
                _ => {},
            }
        }
        Ok(())
    })
}

/// The sum of balances and pending transfers equals the initial total at
/// every tick of the published report.
pub fn conservation() -> OracleFn {
    Box::new(|world| {
        let Protocol::Ledger { balances, .. } = world.protocol() else {
            return Ok(());
        };
        let report = world
            .trace()
            .report()
            .ok_or_else(|| format!("{}: no balance report was published", world.context()))?;

        let total = balances.iter().copied().map(i64::from).sum();
        report.verify(total).map_err(|e| format!("{}: {e}", world.context()))
    })
}

/// Every worker's history has one entry per tick from 0, without gaps.
pub fn history_completeness() -> OracleFn {
    Box::new(|world| {
        if !matches!(world.protocol(), Protocol::Ledger { .. }) {
            return Ok(());
        }
        let report = world
            .trace()
            .report()
            .ok_or_else(|| format!("{}: no balance report was published", world.context()))?;

        let ids: Vec<_> = report.histories().iter().map(|history| history.id).collect();
        let workers: Vec<_> = world.topology().workers().collect();
        if ids != workers {
            return Err(format!(
                "{}: report covers {ids:?}, expected {workers:?}",
                world.context()
            ));
        }

        for history in report.histories() {
            if history.states.is_empty() {
                return Err(format!("{}: history of {} is empty", world.context(), history.id));
            }
            let gap = history
                .states
                .iter()
                .enumerate()
                .find(|(index, state)| usize::try_from(state.time).ok() != Some(*index));
            if let Some((index, state)) = gap {
                return Err(format!(
                    "{}: history of {} has tick {} at index {index}",
                    world.context(),
                    history.id,
                    state.time
                ));
            }
        }
        Ok(())
    })
}

/// The coordinator never issues a TRANSFER or STOP while an ACK is
/// outstanding, and receives exactly one ACK per transfer.
pub fn ack_serialization() -> OracleFn {
    Box::new(|world| {
        let Protocol::Ledger { transfers, .. } = world.protocol() else {
            return Ok(());
        };

        let mut outstanding = false;
        let mut acks = 0;
        for entry in world.trace().entries() {
            match *entry {
                TraceEntry::Sent { from: COORDINATOR, kind, .. }
                    if matches!(kind, MessageType::Transfer | MessageType::Stop) =>
                {
                    if outstanding {
                        return Err(format!(
                            "{}: coordinator sent {kind} with an ACK outstanding",
                            world.context()
                        ));
                    }
                    outstanding = kind == MessageType::Transfer;
                },
                TraceEntry::Delivered { to: COORDINATOR, kind: MessageType::Ack, from, .. } => {
                    if !outstanding {
                        return Err(format!(
                            "{}: unexpected ACK from process {from}",
                            world.context()
                        ));
                    }
                    outstanding = false;
                    acks += 1;
                },
                _ => {},
            }
        }

        if acks == transfers.len() {
            Ok(())
        } else {
            Err(format!(
                "{}: {acks} ACKs for {} transfers",
                world.context(),
                transfers.len()
            ))
        }
    })
}

/// Final worker balances, ascending id.
pub fn final_balances(expected: Vec<Balance>) -> OracleFn {
    Box::new(move |world| {
        let got: Vec<_> = world
            .trace()
            .snapshots()
            .iter()
            .filter_map(|snapshot| snapshot.balance)
            .collect();
        if got == expected {
            Ok(())
        } else {
            Err(format!("{}: final balances {got:?}, expected {expected:?}", world.context()))
        }
    })
}

/// The standard safety set for any protocol.
pub fn safety() -> OracleFn {
    all_of(vec![
        all_finished(),
        mutual_exclusion(),
        request_order(),
        every_acquire_enters(),
        clock_monotonicity(),
        conservation(),
        history_completeness(),
        ack_serialization(),
    ])
}
