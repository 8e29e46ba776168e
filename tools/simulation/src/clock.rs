//! Shared ledger clock
//!
//! Both simulated ledgers read time from one clock so that tests can move
//! past claim windows without sleeping.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SimClock {
    now: Arc<AtomicI64>,
}

impl SimClock {
    /// Clock starting at wall-clock time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now().timestamp())
    }

    pub fn starting_at(epoch_secs: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(epoch_secs)),
        }
    }

    /// Current unix time in seconds.
    pub fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_time() {
        let clock = SimClock::starting_at(1_000);
        let other = clock.clone();
        clock.advance(301);
        assert_eq!(other.now(), 1_301);
    }
}
