use lamport_proto::{Balance, BalanceHistory, BalanceState, ProcessId, Timestamp};

use crate::error::CoreError;

/// Builds a gapless balance timeline for one worker.
///
/// `states[t]` is the balance at the end of tick `t`. Ticks between two
/// recorded changes carry the earlier balance forward.
#[derive(Debug, Clone)]
pub struct HistoryRecorder {
    history: BalanceHistory,
}

impl HistoryRecorder {
    /// Timeline of `id` starting with `initial` at tick 0.
    pub fn new(id: ProcessId, initial: Balance) -> Self {
        let mut history = BalanceHistory::new(id);
        history.states.push(BalanceState { time: 0, balance: initial, pending_in: 0 });
        Self { history }
    }

    /// Samples recorded so far.
    pub fn states(&self) -> &[BalanceState] {
        &self.history.states
    }

    /// Record `balance` as of tick `now`, filling every tick since the last
    /// sample with the previous balance.
    pub fn record(&mut self, now: Timestamp, balance: Balance) -> Result<(), CoreError> {
        let now = self.index(now)?;
        let carried = self.history.states.last().map_or(balance, |state| state.balance);

        while self.history.states.len() < now {
            let time = self.history.states.len() as Timestamp;
            self.history.states.push(BalanceState { time, balance: carried, pending_in: 0 });
        }
        match self.history.states.get_mut(now) {
            Some(state) => state.balance = balance,
            None => self.history.states.push(BalanceState {
                time: now as Timestamp,
                balance,
                pending_in: 0,
            }),
        }
        Ok(())
    }

    /// Add `amount` to `pending_in` for every recorded tick in
    /// `since..until`.
    pub fn add_pending(
        &mut self,
        since: Timestamp,
        until: Timestamp,
        amount: Balance,
    ) -> Result<(), CoreError> {
        let id = self.history.id;
        let since = usize::try_from(since).unwrap_or(0);
        let until = usize::try_from(until).unwrap_or(0).min(self.history.states.len());

        for state in self.history.states.iter_mut().take(until).skip(since) {
            state.pending_in =
                state.pending_in.checked_add(amount).ok_or(CoreError::BalanceOverflow { id })?;
        }
        Ok(())
    }

    /// Close the timeline at `now` with `balance` and hand it over. The
    /// recorder is empty afterwards.
    pub fn finish(
        &mut self,
        now: Timestamp,
        balance: Balance,
    ) -> Result<BalanceHistory, CoreError> {
        self.record(now, balance)?;
        let id = self.history.id;
        Ok(std::mem::replace(&mut self.history, BalanceHistory::new(id)))
    }

    fn index(&self, now: Timestamp) -> Result<usize, CoreError> {
        let id = self.history.id;
        let index = usize::try_from(now).map_err(|_| CoreError::InvalidState {
            state: format!("negative tick {now}"),
            operation: "record",
        })?;
        if index >= BalanceHistory::MAX_STATES {
            return Err(CoreError::HistoryTooLong { id, max: BalanceHistory::MAX_STATES });
        }
        Ok(index)
    }
}
