//! Latched demonstrate-once capability flags.
//!
//! Each flag transitions false → true at most once, the first time the
//! corresponding behavior category is observed, and is never reset.
//! Consumers poll the flags at their own cadence; raising an
//! already-raised flag has no effect.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// The behavior categories the engine demonstrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Transactions were executed.
    Simulation,
    /// A lock acquisition passed through the lock manager.
    AccessControl,
    /// A deadlock detection pass ran.
    DeadlockDetection,
    /// More than one transaction thread ran concurrently.
    MultiThreading,
    /// A deadlock was broken by aborting a victim.
    DeadlockResolution,
    /// A randomized delay was applied.
    RandomizedDelays,
    /// A structured event was emitted.
    DetailedLogging,
}

impl Capability {
    /// All capabilities, in checklist order.
    pub const ALL: [Capability; 7] = [
        Capability::Simulation,
        Capability::AccessControl,
        Capability::DeadlockDetection,
        Capability::MultiThreading,
        Capability::DeadlockResolution,
        Capability::RandomizedDelays,
        Capability::DetailedLogging,
    ];

    /// Human-readable checklist label.
    pub fn label(&self) -> &'static str {
        match self {
            Capability::Simulation => "transaction simulation",
            Capability::AccessControl => "access control",
            Capability::DeadlockDetection => "deadlock identification",
            Capability::MultiThreading => "multi-threaded execution",
            Capability::DeadlockResolution => "deadlock resolution",
            Capability::RandomizedDelays => "randomized delays",
            Capability::DetailedLogging => "detailed logging",
        }
    }

    fn index(self) -> usize {
        match self {
            Capability::Simulation => 0,
            Capability::AccessControl => 1,
            Capability::DeadlockDetection => 2,
            Capability::MultiThreading => 3,
            Capability::DeadlockResolution => 4,
            Capability::RandomizedDelays => 5,
            Capability::DetailedLogging => 6,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One latched boolean per [`Capability`].
#[derive(Debug, Default)]
pub struct CapabilityFlags {
    flags: [AtomicBool; 7],
}

impl CapabilityFlags {
    /// Creates a set of flags, all unraised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises a flag. Returns true only for the caller that raised it
    /// first; every later call is a no-op returning false.
    pub fn mark(&self, capability: Capability) -> bool {
        !self.flags[capability.index()].fetch_or(true, Ordering::SeqCst)
    }

    /// Returns whether a flag has been raised.
    pub fn is_set(&self, capability: Capability) -> bool {
        self.flags[capability.index()].load(Ordering::SeqCst)
    }

    /// Returns the full checklist.
    pub fn snapshot(&self) -> Vec<(Capability, bool)> {
        Capability::ALL
            .iter()
            .map(|&c| (c, self.is_set(c)))
            .collect()
    }

    /// Returns true if every flag has been raised.
    pub fn all_set(&self) -> bool {
        Capability::ALL.iter().all(|&c| self.is_set(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_latches_once() {
        let flags = CapabilityFlags::new();
        assert!(!flags.is_set(Capability::DeadlockDetection));

        assert!(flags.mark(Capability::DeadlockDetection));
        assert!(flags.is_set(Capability::DeadlockDetection));

        // Second raise has no effect.
        assert!(!flags.mark(Capability::DeadlockDetection));
        assert!(flags.is_set(Capability::DeadlockDetection));
    }

    #[test]
    fn test_snapshot_order() {
        let flags = CapabilityFlags::new();
        flags.mark(Capability::Simulation);

        let snapshot = flags.snapshot();
        assert_eq!(snapshot.len(), 7);
        assert_eq!(snapshot[0], (Capability::Simulation, true));
        assert_eq!(snapshot[1], (Capability::AccessControl, false));
        assert!(!flags.all_set());
    }

    #[test]
    fn test_all_set() {
        let flags = CapabilityFlags::new();
        for capability in Capability::ALL {
            flags.mark(capability);
        }
        assert!(flags.all_set());
    }
}
