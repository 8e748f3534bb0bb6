//! Funds-transfer protocol with causal balance history.
//!
//! The coordinator drives a schedule of transfer orders, one in flight at a
//! time: TRANSFER to the source, which debits and forwards the order to the
//! destination, which credits and acknowledges to the coordinator. After
//! the last ACK the coordinator multicasts STOP, waits for every DONE and
//! collects one [`BalanceHistory`](lamport_proto::BalanceHistory) per
//! worker.
//!
//! Histories are indexed by Lamport time. Money that has left a source but
//! not yet reached its destination is recorded as `pending_in` at the
//! destination, so at every tick the sum of balances plus pending amounts
//! equals the initial total. [`AllHistory::verify`] checks exactly that.

mod coordinator;
mod history;
mod report;
mod schedule;
mod worker;

pub use coordinator::LedgerCoordinator;
pub use history::HistoryRecorder;
pub use report::AllHistory;
pub use schedule::{ring_schedule, validate_order};
pub use worker::LedgerWorker;
