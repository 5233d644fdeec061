//! Lock management for competing transactions.
//!
//! This module implements the exclusive lock table:
//! - One owner per resource, FIFO wait queues for blocked callers
//! - Broadcast wakeups on every ownership change
//! - Synchronous deadlock detection on every new wait edge
//! - Forced eviction of deadlock victims
//!
//! # Locking discipline
//!
//! Each resource's owner and wait queue live behind that resource's own
//! mutex, paired with a condvar for wakeups. A caller never holds a
//! resource mutex while detecting: it enqueues, drops the mutex, runs
//! the detection pass (serialized behind one detection mutex, locking
//! each resource briefly in turn), then re-locks and enters the
//! wait/recheck loop. Resource mutexes are therefore always leaf locks
//! and no engine-internal lock cycle can form.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use gridlock_common::{GridlockError, GridlockResult, Priority, TxnId};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, info};

use crate::deadlock::{select_victim, WaitForGraph};
use crate::event::{Event, EventBus, EventKind};
use crate::flags::{Capability, CapabilityFlags};
use crate::stats::EngineStats;
use crate::txn::{TransactionState, TxnRecord};

/// Identifies a lockable resource by its key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a resource ID from a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Mutable lock state of a single resource.
struct ResourceState {
    owner: Option<TxnId>,
    wait_queue: VecDeque<TxnId>,
}

/// A lockable unit: state behind its own mutex, condvar for wakeups.
struct Resource {
    id: ResourceId,
    state: Mutex<ResourceState>,
    available: Condvar,
}

impl Resource {
    fn new(id: ResourceId) -> Self {
        Self {
            id,
            state: Mutex::new(ResourceState {
                owner: None,
                wait_queue: VecDeque::new(),
            }),
            available: Condvar::new(),
        }
    }
}

/// Read-only view of one resource's lock state, for pollers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSnapshot {
    /// The resource key.
    pub id: ResourceId,
    /// Current owner, `None` when free.
    pub owner: Option<TxnId>,
    /// Blocked transactions in FIFO order.
    pub wait_queue: Vec<TxnId>,
}

/// Owns the resource set and mediates all lock traffic.
///
/// The key set is fixed at construction; `acquire` and `release` are the
/// only mutation paths besides victim eviction, which the manager itself
/// performs during detection.
pub struct LockManager {
    resources: HashMap<ResourceId, Resource>,
    registry: RwLock<HashMap<TxnId, Arc<TxnRecord>>>,
    /// Serializes detection passes; at most one runs at a time.
    detection: Mutex<()>,
    stats: EngineStats,
    events: Arc<EventBus>,
    flags: Arc<CapabilityFlags>,
}

impl LockManager {
    /// Creates a lock manager over the given resource keys.
    pub fn new(
        resources: impl IntoIterator<Item = ResourceId>,
        events: Arc<EventBus>,
        flags: Arc<CapabilityFlags>,
    ) -> Self {
        let resources = resources
            .into_iter()
            .map(|id| (id.clone(), Resource::new(id)))
            .collect();
        Self {
            resources,
            registry: RwLock::new(HashMap::new()),
            detection: Mutex::new(()),
            stats: EngineStats::new(),
            events,
            flags,
        }
    }

    /// Registers a transaction so the detector can inspect and evict it.
    pub fn register(&self, record: Arc<TxnRecord>) {
        self.registry.write().insert(record.id(), record);
    }

    /// Acquires `resource` exclusively for the calling transaction,
    /// blocking while another transaction owns it.
    ///
    /// Re-acquiring a resource the caller already owns is a no-op. The
    /// call fails only with [`GridlockError::Aborted`], when the caller
    /// is chosen as a deadlock victim; there is no timeout.
    pub fn acquire(&self, record: &TxnRecord, resource: &ResourceId) -> GridlockResult<()> {
        self.flags.mark(Capability::AccessControl);
        let res = self
            .resources
            .get(resource)
            .ok_or_else(|| GridlockError::UnknownResource(resource.as_str().to_owned()))?;

        // A victim evicted while holding (not waiting) observes the
        // abort here, on its next call into the lock manager.
        if record.take_abort_request() {
            return Err(GridlockError::Aborted(record.id()));
        }

        let started = Instant::now();
        {
            let mut state = res.state.lock();
            if state.owner == Some(record.id()) {
                return Ok(());
            }
            // Grant only when nobody is queued: a late arrival must not
            // barge past a waiter that has not been woken yet.
            if state.owner.is_none() && state.wait_queue.is_empty() {
                state.owner = Some(record.id());
                record.add_held(resource.clone());
                drop(state);
                self.events.publish(Event::txn(
                    record.name(),
                    EventKind::Acquired {
                        resource: resource.clone(),
                    },
                ));
                self.flags.mark(Capability::DetailedLogging);
                return Ok(());
            }

            state.wait_queue.push_back(record.id());
            record.set_state(TransactionState::Waiting);
        }
        self.events.publish(Event::txn(
            record.name(),
            EventKind::Waiting {
                resource: resource.clone(),
            },
        ));
        debug!(txn = %record.id(), resource = %resource, "blocked behind owner");

        // The new wait edge may have closed a cycle.
        self.detect_and_resolve();

        let mut state = res.state.lock();
        loop {
            if record.take_abort_request() {
                // Eviction normally scrubs the queue itself; this covers
                // the window between enqueueing and the eviction pass.
                state.wait_queue.retain(|&id| id != record.id());
                return Err(GridlockError::Aborted(record.id()));
            }
            if state.owner.is_none() && state.wait_queue.front() == Some(&record.id()) {
                state.wait_queue.pop_front();
                state.owner = Some(record.id());
                record.add_held(resource.clone());
                record.set_state(TransactionState::Running);
                let waited = started.elapsed();
                self.stats.record_wait(waited);
                drop(state);
                self.events.publish(Event::txn(
                    record.name(),
                    EventKind::AcquiredAfterWait {
                        resource: resource.clone(),
                        waited,
                    },
                ));
                return Ok(());
            }
            // Broadcast wakeups carry no progress guarantee; re-check
            // both conditions every time.
            res.available.wait(&mut state);
        }
    }

    /// Releases `resource` if the caller owns it and wakes all blocked
    /// parties so they re-check their wait condition.
    ///
    /// Releasing a resource the caller does not own, or an unknown key,
    /// is a silent no-op.
    pub fn release(&self, record: &TxnRecord, resource: &ResourceId) {
        let Some(res) = self.resources.get(resource) else {
            return;
        };
        {
            let mut state = res.state.lock();
            if state.owner != Some(record.id()) {
                return;
            }
            state.owner = None;
            record.remove_held(resource);
            res.available.notify_all();
        }
        self.events.publish(Event::txn(
            record.name(),
            EventKind::Released {
                resource: resource.clone(),
            },
        ));
    }

    /// Runs one detection pass and aborts at most one victim.
    ///
    /// The pass snapshots every resource (locking each briefly, one at a
    /// time), builds the wait-for graph, and resolves the first cycle
    /// found. Multiple independent cycles are resolved by the passes
    /// that subsequent waits trigger.
    fn detect_and_resolve(&self) {
        self.flags.mark(Capability::DeadlockDetection);
        let _pass = self.detection.lock();

        let graph = WaitForGraph::from_snapshot(&self.resource_states());
        let Some(cycle) = graph.find_cycle() else {
            return;
        };

        let victim_record = {
            let registry = self.registry.read();
            let victim = select_victim(&cycle, |id| {
                registry
                    .get(&id)
                    .map(|r| r.priority())
                    .unwrap_or(Priority::new(0))
            });
            victim.and_then(|id| registry.get(&id).cloned())
        };
        let Some(victim) = victim_record else {
            return;
        };

        self.stats.record_deadlock();
        self.flags.mark(Capability::DeadlockResolution);
        info!(cycle = ?cycle, victim = %victim.id(), "deadlock detected");
        self.events.publish(Event::system(EventKind::DeadlockDetected {
            cycle,
            victim: victim.id(),
        }));

        self.abort(&victim);
    }

    /// Evicts a victim: flags it, reclaims everything it owns, and
    /// removes it from every wait queue, waking affected waiters.
    ///
    /// Eviction does not require the victim to be the transaction that
    /// triggered detection; a holder can lose its resources mid-hold.
    fn abort(&self, victim: &TxnRecord) {
        self.stats.record_abort();
        victim.request_abort();

        for id in victim.drain_held() {
            if let Some(res) = self.resources.get(&id) {
                let mut state = res.state.lock();
                if state.owner == Some(victim.id()) {
                    state.owner = None;
                    res.available.notify_all();
                }
            }
        }

        for res in self.resources.values() {
            let mut state = res.state.lock();
            let len = state.wait_queue.len();
            state.wait_queue.retain(|&id| id != victim.id());
            if state.wait_queue.len() != len {
                res.available.notify_all();
            }
        }
    }

    /// Read-only snapshot of every resource, sorted by key.
    pub fn resource_states(&self) -> Vec<ResourceSnapshot> {
        let mut snapshots: Vec<ResourceSnapshot> = self
            .resources
            .values()
            .map(|res| {
                let state = res.state.lock();
                ResourceSnapshot {
                    id: res.id.clone(),
                    owner: state.owner,
                    wait_queue: state.wait_queue.iter().copied().collect(),
                }
            })
            .collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    /// Read-only view of every registered transaction, sorted by ID.
    pub fn transaction_states(&self) -> Vec<(TxnId, String, TransactionState)> {
        let registry = self.registry.read();
        let mut rows: Vec<_> = registry
            .values()
            .map(|r| (r.id(), r.name().to_owned(), r.state()))
            .collect();
        rows.sort_by_key(|(id, _, _)| *id);
        rows
    }

    /// Returns the engine counters.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Returns the number of resources under management.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("resources", &self.resource_count())
            .field("transactions", &self.registry.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn manager(keys: &[&str]) -> Arc<LockManager> {
        let events = Arc::new(EventBus::new());
        let flags = Arc::new(CapabilityFlags::new());
        Arc::new(LockManager::new(
            keys.iter().map(|k| ResourceId::new(*k)),
            events,
            flags,
        ))
    }

    fn record(lm: &LockManager, n: u64) -> Arc<TxnRecord> {
        let record = Arc::new(TxnRecord::new(TxnId::new(n), Priority::new(n)));
        lm.register(record.clone());
        record
    }

    /// Polls `condition` until it holds, panicking after five seconds.
    fn wait_until(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition never became true");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_fast_path_and_reentry() {
        let lm = manager(&["X"]);
        let t1 = record(&lm, 1);
        let x = ResourceId::new("X");

        lm.acquire(&t1, &x).unwrap();
        assert!(t1.holds(&x));

        // Acquiring a resource already owned is a no-op.
        lm.acquire(&t1, &x).unwrap();
        assert_eq!(t1.held_count(), 1);

        let snapshot = &lm.resource_states()[0];
        assert_eq!(snapshot.owner, Some(TxnId::new(1)));
        assert!(snapshot.wait_queue.is_empty());
    }

    #[test]
    fn test_unknown_resource() {
        let lm = manager(&["X"]);
        let t1 = record(&lm, 1);
        let err = lm.acquire(&t1, &ResourceId::new("Z")).unwrap_err();
        assert_eq!(err, GridlockError::UnknownResource("Z".into()));
    }

    #[test]
    fn test_release_is_idempotent() {
        let lm = manager(&["X"]);
        let t1 = record(&lm, 1);
        let t2 = record(&lm, 2);
        let x = ResourceId::new("X");

        lm.acquire(&t1, &x).unwrap();

        // Not the owner: no effect, no error.
        lm.release(&t2, &x);
        assert_eq!(lm.resource_states()[0].owner, Some(TxnId::new(1)));

        // Unknown key: no effect, no error.
        lm.release(&t1, &ResourceId::new("Z"));

        lm.release(&t1, &x);
        assert_eq!(lm.resource_states()[0].owner, None);

        // Double release: no effect.
        lm.release(&t1, &x);
        assert_eq!(lm.resource_states()[0].owner, None);
    }

    #[test]
    fn test_mutual_exclusion_while_held() {
        let lm = manager(&["X"]);
        let t1 = record(&lm, 1);
        let t2 = record(&lm, 2);
        let x = ResourceId::new("X");

        lm.acquire(&t1, &x).unwrap();

        let waiter = thread::spawn({
            let lm = lm.clone();
            let t2 = t2.clone();
            let x = x.clone();
            move || lm.acquire(&t2, &x)
        });

        wait_until(|| lm.resource_states()[0].wait_queue == vec![TxnId::new(2)]);
        // Still exclusively owned while a waiter is queued.
        assert_eq!(lm.resource_states()[0].owner, Some(TxnId::new(1)));
        assert_eq!(t2.state(), TransactionState::Waiting);

        lm.release(&t1, &x);
        waiter.join().unwrap().unwrap();

        assert_eq!(lm.resource_states()[0].owner, Some(TxnId::new(2)));
        assert!(t2.holds(&x));
        assert_eq!(t2.state(), TransactionState::Running);
        assert_eq!(lm.stats().waits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_fifo_grant_order() {
        let lm = manager(&["R"]);
        let t1 = record(&lm, 1);
        let t2 = record(&lm, 2);
        let t3 = record(&lm, 3);
        let r = ResourceId::new("R");
        let order = Arc::new(Mutex::new(Vec::new()));

        lm.acquire(&t1, &r).unwrap();

        let spawn_waiter = |record: Arc<TxnRecord>| {
            let lm = lm.clone();
            let r = r.clone();
            let order = order.clone();
            thread::spawn(move || {
                lm.acquire(&record, &r).unwrap();
                order.lock().push(record.id());
                lm.release(&record, &r);
            })
        };

        let w2 = spawn_waiter(t2);
        wait_until(|| lm.resource_states()[0].wait_queue == vec![TxnId::new(2)]);
        let w3 = spawn_waiter(t3);
        wait_until(|| {
            lm.resource_states()[0].wait_queue == vec![TxnId::new(2), TxnId::new(3)]
        });

        lm.release(&t1, &r);
        w2.join().unwrap();
        w3.join().unwrap();

        assert_eq!(*order.lock(), vec![TxnId::new(2), TxnId::new(3)]);
    }

    #[test]
    fn test_forced_cycle_aborts_youngest_and_cleans_up() {
        let lm = manager(&["X", "Y"]);
        let t1 = record(&lm, 1);
        let t2 = record(&lm, 2);
        let barrier = Arc::new(Barrier::new(2));

        let h1 = thread::spawn({
            let lm = lm.clone();
            let t1 = t1.clone();
            let barrier = barrier.clone();
            move || {
                lm.acquire(&t1, &ResourceId::new("X")).unwrap();
                barrier.wait();
                lm.acquire(&t1, &ResourceId::new("Y"))
            }
        });
        let h2 = thread::spawn({
            let lm = lm.clone();
            let t2 = t2.clone();
            let barrier = barrier.clone();
            move || {
                lm.acquire(&t2, &ResourceId::new("Y")).unwrap();
                barrier.wait();
                lm.acquire(&t2, &ResourceId::new("X"))
            }
        });

        // T1 holds X and wants Y; T2 holds Y and wants X. The cycle is
        // certain, and the younger transaction must be the victim.
        let r1 = h1.join().unwrap();
        let r2 = h2.join().unwrap();
        assert_eq!(r1, Ok(()));
        assert_eq!(r2, Err(GridlockError::Aborted(TxnId::new(2))));

        assert_eq!(lm.stats().deadlocks.load(Ordering::Relaxed), 1);
        assert_eq!(lm.stats().aborts.load(Ordering::Relaxed), 1);

        // Victim cleanup: owns nothing, queued nowhere; the survivor
        // made progress on the freed resource.
        assert_eq!(t2.held_count(), 0);
        for snapshot in lm.resource_states() {
            assert!(!snapshot.wait_queue.contains(&TxnId::new(2)));
            assert_eq!(snapshot.owner, Some(TxnId::new(1)));
        }
        assert!(t1.holds(&ResourceId::new("X")));
        assert!(t1.holds(&ResourceId::new("Y")));
    }

    #[test]
    fn test_identical_order_never_deadlocks() {
        let lm = manager(&["X", "Y"]);
        let mut handles = Vec::new();
        for n in 1..=4 {
            let record = record(&lm, n);
            let lm = lm.clone();
            handles.push(thread::spawn(move || {
                for key in ["X", "Y"] {
                    lm.acquire(&record, &ResourceId::new(key)).unwrap();
                }
                thread::sleep(Duration::from_millis(2));
                for key in ["X", "Y"] {
                    lm.release(&record, &ResourceId::new(key));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(lm.stats().deadlocks.load(Ordering::Relaxed), 0);
        for snapshot in lm.resource_states() {
            assert_eq!(snapshot.owner, None);
            assert!(snapshot.wait_queue.is_empty());
        }
    }
}
