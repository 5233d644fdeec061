//! Structured event notifications emitted by the engine.
//!
//! Every lock-state and lifecycle transition produces an [`Event`] that is
//! fanned out to all subscribers. Consumers (loggers, visualization) must
//! tolerate any interleaving and volume; the engine never blocks on a
//! subscriber, and subscribers that disappear are pruned on the next
//! publish.

use std::fmt;
use std::time::{Duration, SystemTime};

use crossbeam_channel::{unbounded, Receiver, Sender};
use gridlock_common::TxnId;
use parking_lot::Mutex;

use crate::lock::ResourceId;

/// The category of a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A transaction entered execution (emitted once per attempt).
    Started,
    /// A lock was granted without waiting.
    Acquired {
        /// The locked resource.
        resource: ResourceId,
    },
    /// The caller was enqueued behind the current owner.
    Waiting {
        /// The contended resource.
        resource: ResourceId,
    },
    /// A lock was granted after a wait.
    AcquiredAfterWait {
        /// The locked resource.
        resource: ResourceId,
        /// How long the caller was blocked.
        waited: Duration,
    },
    /// A lock was released by its owner.
    Released {
        /// The released resource.
        resource: ResourceId,
    },
    /// The transaction performed its work while holding its full plan.
    WorkPerformed {
        /// The resources written.
        resources: Vec<ResourceId>,
    },
    /// A circular wait was found and a victim chosen.
    DeadlockDetected {
        /// The transactions forming the cycle.
        cycle: Vec<TxnId>,
        /// The cycle member selected for abort.
        victim: TxnId,
    },
    /// The transaction was aborted and will restart.
    Aborted,
    /// The transaction committed (terminal).
    Committed,
    /// Every transaction has committed; the run is over.
    RunComplete,
}

/// A single engine notification.
#[derive(Debug, Clone)]
pub struct Event {
    /// When the event was emitted.
    pub at: SystemTime,
    /// Display name of the emitting transaction; `None` for system-level
    /// events such as deadlock detection and run completion.
    pub txn: Option<String>,
    /// What happened.
    pub kind: EventKind,
}

impl Event {
    /// Creates an event attributed to a transaction.
    pub fn txn(name: impl Into<String>, kind: EventKind) -> Self {
        Self {
            at: SystemTime::now(),
            txn: Some(name.into()),
            kind,
        }
    }

    /// Creates a system-level event with no emitting transaction.
    pub fn system(kind: EventKind) -> Self {
        Self {
            at: SystemTime::now(),
            txn: None,
            kind,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.txn.as_deref().unwrap_or("?");
        match &self.kind {
            EventKind::Started => write!(f, "{name} entered execution"),
            EventKind::Acquired { resource } => {
                write!(f, "{name} acquired lock({resource})")
            }
            EventKind::Waiting { resource } => {
                write!(f, "{name} waiting for lock({resource})")
            }
            EventKind::AcquiredAfterWait { resource, waited } => {
                write!(f, "{name} acquired lock({resource}) after {waited:?}")
            }
            EventKind::Released { resource } => {
                write!(f, "{name} released lock({resource})")
            }
            EventKind::WorkPerformed { resources } => {
                let keys: Vec<&str> = resources.iter().map(ResourceId::as_str).collect();
                write!(f, "{name} wrote {}", keys.join(", "))
            }
            EventKind::DeadlockDetected { cycle, victim } => {
                let members: Vec<String> = cycle.iter().map(|id| id.display_name()).collect();
                write!(
                    f,
                    "deadlock detected among [{}], aborting {}",
                    members.join(", "),
                    victim.display_name()
                )
            }
            EventKind::Aborted => write!(f, "{name} aborted, restarting"),
            EventKind::Committed => write!(f, "{name} committed"),
            EventKind::RunComplete => write!(f, "all transactions committed"),
        }
    }
}

/// Fan-out delivery of [`Event`]s to any number of subscribers.
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<Event>>>,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new subscriber and returns its receiving end.
    ///
    /// Events published before the subscription are not replayed.
    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Delivers an event to every live subscriber.
    ///
    /// Subscribers whose receiver has been dropped are removed.
    pub fn publish(&self, event: Event) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_fans_out() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        bus.publish(Event::txn("T1", EventKind::Committed));

        assert_eq!(rx1.recv().unwrap().txn.as_deref(), Some("T1"));
        assert_eq!(rx2.recv().unwrap().kind, EventKind::Committed);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx2);
        bus.publish(Event::system(EventKind::RunComplete));

        assert_eq!(bus.subscriber_count(), 1);
        assert!(rx1.recv().is_ok());
    }

    #[test]
    fn test_display() {
        let waiting = Event::txn(
            "T2",
            EventKind::Waiting {
                resource: ResourceId::new("X"),
            },
        );
        assert_eq!(waiting.to_string(), "T2 waiting for lock(X)");

        let deadlock = Event::system(EventKind::DeadlockDetected {
            cycle: vec![TxnId::new(1), TxnId::new(2)],
            victim: TxnId::new(2),
        });
        assert_eq!(
            deadlock.to_string(),
            "deadlock detected among [T1, T2], aborting T2"
        );

        let work = Event::txn(
            "T1",
            EventKind::WorkPerformed {
                resources: vec![ResourceId::new("X"), ResourceId::new("Y")],
            },
        );
        assert_eq!(work.to_string(), "T1 wrote X, Y");
    }
}
