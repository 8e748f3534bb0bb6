//! Run-wide abort signal.
//!
//! Processes are threads of one OS process, so a failing process cannot
//! kill its siblings. It raises this flag instead; every spinning send or
//! receive checks it between attempts and bails out with
//! [`ChannelError::Aborted`](crate::error::ChannelError::Aborted).

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Shared abort flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    /// Lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every process to stop. Returns whether this call raised the
    /// flag, i.e. the caller is the first to fail.
    pub fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    /// Whether the run is being torn down.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = AbortFlag::new();
        let other = flag.clone();
        assert!(!other.is_raised());

        assert!(flag.raise());
        assert!(other.is_raised());
        assert!(!other.raise());
    }
}
