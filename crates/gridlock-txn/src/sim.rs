//! Simulation driver: configuration, transaction construction, and the
//! top-level join that ends a run once every transaction has committed.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gridlock_common::{GridlockError, GridlockResult, Priority, TxnId};

use crate::event::{Event, EventBus, EventKind};
use crate::flags::{Capability, CapabilityFlags};
use crate::lock::{LockManager, ResourceId};
use crate::stats::EngineStats;
use crate::txn::{DelayBounds, Transaction, TxnRecord};

/// Parameters shaping transaction construction.
///
/// These are consumed from outside the engine (CLI, tests); none of them
/// alters lock-manager logic.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of concurrent transactions.
    pub transactions: usize,
    /// The shared resource set, acquired in this order.
    pub resources: Vec<ResourceId>,
    /// Seed for the per-transaction delay generators.
    pub seed: u64,
    /// Shortest randomized pause between plan steps.
    pub min_delay: Duration,
    /// Longest randomized pause between plan steps.
    pub max_delay: Duration,
    /// Reverse the acquisition order of even-priority transactions to
    /// deliberately manufacture circular wait.
    pub force_deadlock: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            transactions: 4,
            resources: vec![ResourceId::new("X"), ResourceId::new("Y")],
            seed: 42,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            force_deadlock: false,
        }
    }
}

impl SimulationConfig {
    /// Rejects malformed parameters before any thread is spawned.
    pub fn validate(&self) -> GridlockResult<()> {
        if self.transactions == 0 {
            return Err(GridlockError::InvalidConfig(
                "transaction count must be positive".into(),
            ));
        }
        if self.resources.is_empty() {
            return Err(GridlockError::InvalidConfig(
                "resource set must not be empty".into(),
            ));
        }
        let mut keys: Vec<&str> = self.resources.iter().map(ResourceId::as_str).collect();
        keys.sort_unstable();
        keys.dedup();
        if keys.len() != self.resources.len() {
            return Err(GridlockError::InvalidConfig(
                "resource keys must be unique".into(),
            ));
        }
        if self.min_delay > self.max_delay {
            return Err(GridlockError::InvalidConfig(
                "minimum delay exceeds maximum delay".into(),
            ));
        }
        Ok(())
    }
}

/// Final metrics of a completed run.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Number of transactions that ran.
    pub transactions: usize,
    /// Deadlock cycles found.
    pub deadlocks: u64,
    /// Victim aborts performed.
    pub aborts: u64,
    /// Commits (equals `transactions` for a completed run).
    pub commits: u64,
    /// Mean blocked time across all granted waits.
    pub average_wait: Duration,
    /// The capability checklist at run end.
    pub capabilities: Vec<(Capability, bool)>,
}

/// Owns the engine pieces for one run and drives it to completion.
pub struct Simulation {
    config: SimulationConfig,
    lock_manager: Arc<LockManager>,
    events: Arc<EventBus>,
    flags: Arc<CapabilityFlags>,
}

impl Simulation {
    /// Validates the configuration and assembles the engine.
    pub fn new(config: SimulationConfig) -> GridlockResult<Self> {
        config.validate()?;
        let events = Arc::new(EventBus::new());
        let flags = Arc::new(CapabilityFlags::new());
        let lock_manager = Arc::new(LockManager::new(
            config.resources.iter().cloned(),
            events.clone(),
            flags.clone(),
        ));
        Ok(Self {
            config,
            lock_manager,
            events,
            flags,
        })
    }

    /// Registers an event subscriber. Subscribe before calling
    /// [`Simulation::run`] to observe the full stream.
    pub fn subscribe(&self) -> crossbeam_channel::Receiver<Event> {
        self.events.subscribe()
    }

    /// Returns the lock manager, for read-only state polling.
    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    /// Returns the capability flags.
    pub fn flags(&self) -> &Arc<CapabilityFlags> {
        &self.flags
    }

    /// Returns the engine counters.
    pub fn stats(&self) -> &EngineStats {
        self.lock_manager.stats()
    }

    /// Spawns one thread per transaction and joins until every one has
    /// committed, which is the only way a run ends.
    pub fn run(&self) -> GridlockResult<SimulationReport> {
        let mut handles = Vec::with_capacity(self.config.transactions);

        for n in 1..=self.config.transactions as u64 {
            let id = TxnId::new(n);
            let record = Arc::new(TxnRecord::new(id, Priority::new(n)));
            self.lock_manager.register(record.clone());

            let txn = Transaction::new(
                record,
                self.plan_for(n),
                self.lock_manager.clone(),
                self.events.clone(),
                self.flags.clone(),
                DelayBounds::new(self.config.min_delay, self.config.max_delay),
                self.config.seed.wrapping_add(n),
            );
            let handle = thread::Builder::new()
                .name(format!("txn-{n}"))
                .spawn(move || txn.run())
                .map_err(|e| GridlockError::Internal(format!("failed to spawn thread: {e}")))?;
            handles.push(handle);
        }

        for handle in handles {
            handle
                .join()
                .map_err(|_| GridlockError::Internal("transaction thread panicked".into()))??;
        }

        self.events.publish(Event::system(EventKind::RunComplete));

        let stats = self.lock_manager.stats();
        Ok(SimulationReport {
            transactions: self.config.transactions,
            deadlocks: stats.deadlocks.load(std::sync::atomic::Ordering::Relaxed),
            aborts: stats.aborts.load(std::sync::atomic::Ordering::Relaxed),
            commits: stats.commits.load(std::sync::atomic::Ordering::Relaxed),
            average_wait: stats.average_wait(),
            capabilities: self.flags.snapshot(),
        })
    }

    /// The acquisition plan for the `n`-th transaction: the configured
    /// resource order, reversed for even priorities under forced
    /// contention.
    fn plan_for(&self, n: u64) -> Vec<ResourceId> {
        let mut plan = self.config.resources.clone();
        if self.config.force_deadlock && n % 2 == 0 {
            plan.reverse();
        }
        plan
    }
}
