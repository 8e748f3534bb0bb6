use lamport_proto::{Balance, TransferOrder};

use crate::{error::CoreError, topology::Topology};

/// Default schedule: `i → i+1` moving `i` for every worker but the last,
/// then `n → 1` moving 1 to close the ring.
pub fn ring_schedule(topology: Topology) -> Vec<TransferOrder> {
    let workers = topology.worker_count() as u8;

    let mut orders: Vec<_> = (1..workers)
        .map(|src| TransferOrder { src, dst: src + 1, amount: Balance::from(src) })
        .collect();
    if workers > 1 {
        orders.push(TransferOrder { src: workers, dst: 1, amount: 1 });
    }
    orders
}

/// Check that `order` can run on `topology`.
///
/// # Errors
///
/// `InvalidTransfer` if either end is not a worker, both ends are the same
/// worker, or the amount is not positive.
pub fn validate_order(topology: Topology, order: TransferOrder) -> Result<(), CoreError> {
    let reason = if !topology.is_worker(order.src) {
        "source is not a worker"
    } else if !topology.is_worker(order.dst) {
        "destination is not a worker"
    } else if order.src == order.dst {
        "source and destination are the same"
    } else if order.amount <= 0 {
        "amount must be positive"
    } else {
        return Ok(());
    };
    Err(CoreError::InvalidTransfer { order, reason })
}
