//! # gridlock-txn
//!
//! Lock management and deadlock resolution engine for Gridlock.
//!
//! This crate provides:
//!
//! - **Lock Management**: exclusive per-resource locks with FIFO wait
//!   queues and broadcast wakeups.
//!
//! - **Deadlock Detection**: wait-for graph based cycle detection,
//!   triggered synchronously whenever a new wait edge appears.
//!
//! - **Deadlock Resolution**: victim selection (abort the youngest cycle
//!   member) and forced eviction that unblocks the remaining waiters.
//!
//! - **Transaction Lifecycle**: a run loop per transaction that acquires
//!   its plan in order, commits, and transparently retries after an abort.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Simulation                            │
//! │                            │                                 │
//! │        ┌───────────────────┼───────────────────┐             │
//! │        ▼                   ▼                   ▼             │
//! │ ┌─────────────┐    ┌──────────────┐    ┌──────────────┐     │
//! │ │ Transaction │───▶│ LockManager  │───▶│ WaitForGraph │     │
//! │ │  (thread)   │    │              │    │  (detector)  │     │
//! │ └─────────────┘    └──────────────┘    └──────────────┘     │
//! │        │                   │                   │             │
//! │        └───────────────────┼───────────────────┘             │
//! │                            ▼                                 │
//! │               ┌─────────────────────────┐                    │
//! │               │ EventBus / EngineStats  │                    │
//! │               │    CapabilityFlags      │                    │
//! │               └─────────────────────────┘                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```ignore
//! use gridlock_txn::{Simulation, SimulationConfig};
//!
//! let mut config = SimulationConfig::default();
//! config.force_deadlock = true;
//!
//! let sim = Simulation::new(config).unwrap();
//! let events = sim.subscribe();
//! let report = sim.run().unwrap();
//! assert_eq!(report.commits as usize, report.transactions);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Wait-for graph construction and cycle detection.
///
/// This module provides:
/// - [`deadlock::WaitForGraph`]: waiter → holder dependency edges
/// - [`deadlock::select_victim`]: youngest-cycle-member victim choice
pub mod deadlock;

/// Structured event notifications.
///
/// This module provides:
/// - [`event::Event`] and [`event::EventKind`]: the notification payloads
/// - [`event::EventBus`]: fan-out delivery to any number of subscribers
pub mod event;

/// Latched capability flags.
pub mod flags;

/// Lock table implementation.
///
/// This module provides:
/// - [`lock::LockManager`]: owns all resources, acquire/release/evict
/// - [`lock::ResourceId`]: identifies lockable resources
/// - [`lock::ResourceSnapshot`]: read-only state for pollers
pub mod lock;

/// Simulation driver and configuration.
pub mod sim;

/// Engine counters.
pub mod stats;

/// Transaction lifecycle management.
///
/// This module provides:
/// - [`txn::Transaction`]: the per-thread run loop
/// - [`txn::TxnRecord`]: the shared control block
/// - [`txn::TransactionState`]: lifecycle states
pub mod txn;

// Re-export commonly used types

pub use deadlock::{select_victim, WaitForGraph};
pub use event::{Event, EventBus, EventKind};
pub use flags::{Capability, CapabilityFlags};
pub use lock::{LockManager, ResourceId, ResourceSnapshot};
pub use sim::{Simulation, SimulationConfig, SimulationReport};
pub use stats::EngineStats;
pub use txn::{DelayBounds, Transaction, TransactionState, TxnRecord};
