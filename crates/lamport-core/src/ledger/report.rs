use std::fmt;

use lamport_proto::{Balance, BalanceHistory, BalanceState, ProcessId, Timestamp};

use crate::error::CoreError;

/// Balance histories of every worker, as collected by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllHistory {
    histories: Vec<BalanceHistory>,
}

impl AllHistory {
    /// Report over `histories`, sorted by worker id.
    pub fn new(histories: impl IntoIterator<Item = BalanceHistory>) -> Self {
        let mut histories: Vec<_> = histories.into_iter().collect();
        histories.sort_by_key(|history| history.id);
        Self { histories }
    }

    /// Histories, ascending id.
    pub fn histories(&self) -> &[BalanceHistory] {
        &self.histories
    }

    /// Latest tick any history reaches.
    pub fn final_time(&self) -> Timestamp {
        self.histories.iter().filter_map(BalanceHistory::last_time).max().unwrap_or(0)
    }

    /// State of `id` at `time`. Past the end of its history a worker keeps
    /// its last balance with nothing pending.
    pub fn state_at(&self, id: ProcessId, time: Timestamp) -> Option<BalanceState> {
        let history = self.histories.iter().find(|history| history.id == id)?;
        let index = usize::try_from(time).ok()?;

        match history.states.get(index) {
            Some(state) => Some(*state),
            None => history.states.last().map(|last| BalanceState {
                time,
                balance: last.balance,
                pending_in: 0,
            }),
        }
    }

    /// Sum of balances and pending transfers over all workers at `time`.
    pub fn total_at(&self, time: Timestamp) -> i64 {
        self.histories
            .iter()
            .filter_map(|history| self.state_at(history.id, time))
            .map(|state| i64::from(state.balance) + i64::from(state.pending_in))
            .sum()
    }

    /// Final balance of every worker.
    pub fn final_balances(&self) -> Vec<(ProcessId, Balance)> {
        self.histories
            .iter()
            .filter_map(|history| history.states.last().map(|last| (history.id, last.balance)))
            .collect()
    }

    /// Check that every history is gapless and that every tick conserves
    /// `expected`.
    ///
    /// # Errors
    ///
    /// - `IncompleteHistory` for the first history with a missing tick
    /// - `Inconsistent` for the first tick whose total diverges
    pub fn verify(&self, expected: i64) -> Result<(), CoreError> {
        for history in &self.histories {
            let gap = history
                .states
                .iter()
                .enumerate()
                .find(|(index, state)| usize::try_from(state.time).ok() != Some(*index));
            if let Some((index, _)) = gap {
                return Err(CoreError::IncompleteHistory {
                    id: history.id,
                    time: index as Timestamp,
                });
            }
            if history.states.is_empty() {
                return Err(CoreError::IncompleteHistory { id: history.id, time: 0 });
            }
        }

        for time in 0..=self.final_time() {
            let total = self.total_at(time);
            if total != expected {
                return Err(CoreError::Inconsistent { time, total, expected });
            }
        }
        Ok(())
    }
}

impl fmt::Display for AllHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let final_time = self.final_time();
        writeln!(f, "Balance history for ticks 0..={final_time}")?;

        write!(f, "{:>5}", "time")?;
        for history in &self.histories {
            write!(f, " | {:>7}", history.id)?;
        }

        for time in 0..=final_time {
            write!(f, "\n{time:>5}")?;
            for history in &self.histories {
                let cell = match self.state_at(history.id, time) {
                    Some(BalanceState { pending_in: 0, balance, .. }) => balance.to_string(),
                    Some(BalanceState { balance, pending_in, .. }) => {
                        format!("{balance}+{pending_in}")
                    },
                    None => String::from("-"),
                };
                write!(f, " | {cell:>7}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(id: ProcessId, samples: &[(Balance, Balance)]) -> BalanceHistory {
        BalanceHistory {
            id,
            states: samples
                .iter()
                .enumerate()
                .map(|(time, (balance, pending_in))| BalanceState {
                    time: time as Timestamp,
                    balance: *balance,
                    pending_in: *pending_in,
                })
                .collect(),
        }
    }

    fn transfer_report() -> AllHistory {
        // Process 1 sends 5 at tick 2, process 2 receives it at tick 3.
        AllHistory::new([
            history(2, &[(20, 0), (20, 0), (20, 5), (25, 0)]),
            history(1, &[(10, 0), (10, 0), (5, 0)]),
        ])
    }

    #[test]
    fn sorted_and_padded() {
        let report = transfer_report();

        assert_eq!(report.histories()[0].id, 1);
        assert_eq!(report.final_time(), 3);
        assert_eq!(
            report.state_at(1, 3),
            Some(BalanceState { time: 3, balance: 5, pending_in: 0 })
        );
        assert_eq!(report.state_at(4, 0), None);
        assert_eq!(report.final_balances(), vec![(1, 5), (2, 25)]);
    }

    #[test]
    fn pending_money_is_conserved() {
        let report = transfer_report();

        assert!((0..=3).all(|time| report.total_at(time) == 30));
        assert_eq!(report.verify(30), Ok(()));
    }

    #[test]
    fn lost_money_is_reported() {
        let report = AllHistory::new([
            history(1, &[(10, 0), (5, 0)]),
            history(2, &[(20, 0), (20, 0), (25, 0)]),
        ]);

        assert_eq!(
            report.verify(30),
            Err(CoreError::Inconsistent { time: 1, total: 25, expected: 30 })
        );
    }

    #[test]
    fn gap_is_reported() {
        let mut broken = history(1, &[(10, 0), (10, 0), (10, 0)]);
        broken.states.remove(1);

        assert_eq!(
            AllHistory::new([broken]).verify(10),
            Err(CoreError::IncompleteHistory { id: 1, time: 1 })
        );
    }

    #[test]
    fn table() {
        insta::assert_snapshot!(transfer_report(), @r"
        Balance history for ticks 0..=3
         time |       1 |       2
            0 |      10 |      20
            1 |      10 |      20
            2 |       5 |    20+5
            3 |       5 |      25
        ");
    }
}
