//! Transaction lifecycle management.
//!
//! A transaction is a unit of work with a fixed acquisition plan over
//! the resource set. Each one runs on its own OS thread and cycles
//! through the states below until it commits.
//!
//! # Transaction States
//!
//! ```text
//!                acquire blocks        granted
//! ┌─────────┐ ─────────────────▶ ┌─────────┐
//! │ Running │ ◀───────────────── │ Waiting │
//! └─────────┘                    └─────────┘
//!      │  ▲                           │ chosen as victim
//!      │  │ backoff + restart         ▼
//!      │  │                      ┌─────────┐
//!      │  └───────────────────── │ Aborted │
//!      ▼                         └─────────┘
//! ┌───────────┐
//! │ Committed │  (terminal)
//! └───────────┘
//! ```
//!
//! `Aborted` is a transient recovery state, not terminal: the victim
//! forfeits all partial progress, backs off for a randomized delay, and
//! restarts its plan from the first step.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gridlock_common::{GridlockResult, Priority, TxnId};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::event::{Event, EventBus, EventKind};
use crate::flags::{Capability, CapabilityFlags};
use crate::lock::{LockManager, ResourceId};

/// The lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No pending wait; executing its plan.
    Running,
    /// Blocked on exactly one resource.
    Waiting,
    /// Interrupted by deadlock resolution; will restart.
    Aborted,
    /// Finished successfully (terminal).
    Committed,
}

impl TransactionState {
    /// Returns true if the transaction has finished for good.
    pub fn is_terminal(&self) -> bool {
        *self == TransactionState::Committed
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Running => write!(f, "Running"),
            TransactionState::Waiting => write!(f, "Waiting"),
            TransactionState::Aborted => write!(f, "Aborted"),
            TransactionState::Committed => write!(f, "Committed"),
        }
    }
}

/// The shared control block of a transaction.
///
/// One `TxnRecord` is allocated per transaction and shared (via `Arc`)
/// between the transaction's own thread and the lock manager, which
/// reads the priority for victim selection, sets the abort flag, and
/// reclaims the held set when evicting.
pub struct TxnRecord {
    id: TxnId,
    name: String,
    priority: Priority,
    abort_requested: AtomicBool,
    held: Mutex<HashSet<ResourceId>>,
    state: Mutex<TransactionState>,
}

impl TxnRecord {
    /// Creates a control block in the `Running` state.
    pub fn new(id: TxnId, priority: Priority) -> Self {
        Self {
            id,
            name: id.display_name(),
            priority,
            abort_requested: AtomicBool::new(false),
            held: Mutex::new(HashSet::new()),
            state: Mutex::new(TransactionState::Running),
        }
    }

    /// Returns the transaction ID.
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Returns the display name, e.g. `T1`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the creation-order priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Returns how many resources the transaction currently owns.
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }

    /// Returns whether the transaction currently owns `resource`.
    pub fn holds(&self, resource: &ResourceId) -> bool {
        self.held.lock().contains(resource)
    }

    /// Flags the transaction for abort. Set only by the detector.
    pub(crate) fn request_abort(&self) {
        self.abort_requested.store(true, Ordering::SeqCst);
    }

    /// Consumes a pending abort request, if any.
    ///
    /// The flag is cleared by the same call that observes it, so one
    /// abort causes exactly one failed acquire.
    pub(crate) fn take_abort_request(&self) -> bool {
        self.abort_requested.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    pub(crate) fn add_held(&self, resource: ResourceId) {
        self.held.lock().insert(resource);
    }

    pub(crate) fn remove_held(&self, resource: &ResourceId) {
        self.held.lock().remove(resource);
    }

    /// Empties the held set, returning what was owned. Used by eviction.
    pub(crate) fn drain_held(&self) -> Vec<ResourceId> {
        self.held.lock().drain().collect()
    }
}

impl fmt::Debug for TxnRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxnRecord")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("state", &self.state())
            .field("held", &self.held_count())
            .finish()
    }
}

/// Inclusive bounds for the randomized pauses between plan steps.
#[derive(Debug, Clone, Copy)]
pub struct DelayBounds {
    /// Shortest pause.
    pub min: Duration,
    /// Longest pause.
    pub max: Duration,
}

impl DelayBounds {
    /// Creates delay bounds. `min` must not exceed `max` (validated by
    /// the simulation configuration).
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }
}

/// A transaction worker: the run loop executed on a dedicated thread.
pub struct Transaction {
    record: Arc<TxnRecord>,
    plan: Vec<ResourceId>,
    lock_manager: Arc<LockManager>,
    events: Arc<EventBus>,
    flags: Arc<CapabilityFlags>,
    delay: DelayBounds,
    rng: StdRng,
}

impl Transaction {
    /// Creates a worker with its own seeded RNG.
    pub fn new(
        record: Arc<TxnRecord>,
        plan: Vec<ResourceId>,
        lock_manager: Arc<LockManager>,
        events: Arc<EventBus>,
        flags: Arc<CapabilityFlags>,
        delay: DelayBounds,
        seed: u64,
    ) -> Self {
        Self {
            record,
            plan,
            lock_manager,
            events,
            flags,
            delay,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Runs attempts until the transaction commits.
    ///
    /// An abort never escapes this loop: it is observed exactly once,
    /// partial progress is discarded (the detector already reclaimed the
    /// held set), and the plan restarts from its first step after a
    /// randomized backoff. Any other error is a precondition violation
    /// and propagates.
    pub fn run(mut self) -> GridlockResult<()> {
        self.flags.mark(Capability::Simulation);
        self.flags.mark(Capability::MultiThreading);

        loop {
            match self.attempt() {
                Ok(()) => {
                    self.record.set_state(TransactionState::Committed);
                    self.lock_manager.stats().record_commit();
                    self.events
                        .publish(Event::txn(self.record.name(), EventKind::Committed));
                    return Ok(());
                }
                Err(err) if err.is_aborted() => {
                    self.record.set_state(TransactionState::Aborted);
                    self.events
                        .publish(Event::txn(self.record.name(), EventKind::Aborted));
                    self.pause();
                    self.record.set_state(TransactionState::Running);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One pass over the acquisition plan.
    fn attempt(&mut self) -> GridlockResult<()> {
        self.events
            .publish(Event::txn(self.record.name(), EventKind::Started));
        self.flags.mark(Capability::DetailedLogging);
        self.pause();

        for index in 0..self.plan.len() {
            let resource = self.plan[index].clone();
            self.lock_manager.acquire(&self.record, &resource)?;
            // The pause after the final acquisition is the abstract work
            // performed while holding the full plan.
            self.pause();
        }

        self.events.publish(Event::txn(
            self.record.name(),
            EventKind::WorkPerformed {
                resources: self.plan.clone(),
            },
        ));

        for resource in &self.plan {
            self.lock_manager.release(&self.record, resource);
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.flags.mark(Capability::RandomizedDelays);
        let duration = self.rng.gen_range(self.delay.min..=self.delay.max);
        thread::sleep(duration);
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("record", &self.record)
            .field("plan", &self.plan)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_defaults() {
        let record = TxnRecord::new(TxnId::new(3), Priority::new(3));
        assert_eq!(record.id(), TxnId::new(3));
        assert_eq!(record.name(), "T3");
        assert_eq!(record.state(), TransactionState::Running);
        assert_eq!(record.held_count(), 0);
        assert!(!record.take_abort_request());
    }

    #[test]
    fn test_abort_request_consumed_once() {
        let record = TxnRecord::new(TxnId::new(1), Priority::new(1));
        record.request_abort();
        assert!(record.take_abort_request());
        assert!(!record.take_abort_request());
    }

    #[test]
    fn test_held_tracking() {
        let record = TxnRecord::new(TxnId::new(1), Priority::new(1));
        let x = ResourceId::new("X");
        let y = ResourceId::new("Y");

        record.add_held(x.clone());
        record.add_held(y.clone());
        assert!(record.holds(&x));
        assert_eq!(record.held_count(), 2);

        record.remove_held(&x);
        assert!(!record.holds(&x));

        let drained = record.drain_held();
        assert_eq!(drained, vec![y]);
        assert_eq!(record.held_count(), 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TransactionState::Running.to_string(), "Running");
        assert_eq!(TransactionState::Committed.to_string(), "Committed");
        assert!(TransactionState::Committed.is_terminal());
        assert!(!TransactionState::Aborted.is_terminal());
    }
}
