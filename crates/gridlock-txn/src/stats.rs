//! Engine counters shared between the acquire/detection paths and any
//! number of readers. All updates are atomic; nothing is ever reset.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Running metrics for a simulation.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Deadlock cycles found.
    pub deadlocks: AtomicU64,
    /// Victim transactions aborted.
    pub aborts: AtomicU64,
    /// Transactions committed.
    pub commits: AtomicU64,
    /// Lock waits that ended in a grant.
    pub waits: AtomicU64,
    /// Accumulated wait time across all granted waits, in microseconds.
    pub wait_micros: AtomicU64,
}

impl EngineStats {
    /// Creates zeroed stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a detected deadlock.
    pub fn record_deadlock(&self) {
        self.deadlocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a victim abort.
    pub fn record_abort(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a commit.
    pub fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a wait that ended in a grant.
    pub fn record_wait(&self, waited: Duration) {
        self.waits.fetch_add(1, Ordering::Relaxed);
        self.wait_micros
            .fetch_add(waited.as_micros() as u64, Ordering::Relaxed);
    }

    /// Mean wait duration over all granted waits, zero if none occurred.
    pub fn average_wait(&self) -> Duration {
        let samples = self.waits.load(Ordering::Relaxed);
        if samples == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.wait_micros.load(Ordering::Relaxed) / samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = EngineStats::new();
        stats.record_deadlock();
        stats.record_abort();
        stats.record_commit();
        stats.record_commit();

        assert_eq!(stats.deadlocks.load(Ordering::Relaxed), 1);
        assert_eq!(stats.aborts.load(Ordering::Relaxed), 1);
        assert_eq!(stats.commits.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_average_wait() {
        let stats = EngineStats::new();
        assert_eq!(stats.average_wait(), Duration::ZERO);

        stats.record_wait(Duration::from_millis(10));
        stats.record_wait(Duration::from_millis(30));
        assert_eq!(stats.average_wait(), Duration::from_millis(20));
    }
}
