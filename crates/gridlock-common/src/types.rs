//! Core identifier types for Gridlock.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction identifier - uniquely identifies a transaction.
///
/// Transaction IDs are assigned sequentially at simulation start and
/// remain stable for the life of the process: an aborted transaction
/// keeps its ID across restarts of its acquisition plan.
///
/// # Example
///
/// ```rust
/// use gridlock_common::TxnId;
///
/// let txn = TxnId::new(1);
/// assert!(txn.is_valid());
/// assert_eq!(txn.display_name(), "T1");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TxnId(u64);

impl TxnId {
    /// Invalid transaction ID, used as a sentinel value.
    pub const INVALID: Self = Self(0);

    /// Minimum valid transaction ID.
    pub const MIN: Self = Self(1);

    /// Creates a new `TxnId` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Checks if this is a valid transaction ID.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }

    /// Returns the display name used in logs and events, e.g. `T3`.
    #[must_use]
    pub fn display_name(self) -> String {
        format!("T{}", self.0)
    }
}

impl fmt::Debug for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "TxnId(INVALID)")
        } else {
            write!(f, "TxnId({})", self.0)
        }
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TxnId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<TxnId> for u64 {
    #[inline]
    fn from(id: TxnId) -> Self {
        id.0
    }
}

/// Creation-order priority of a transaction.
///
/// Priorities are assigned monotonically at creation: a numerically
/// greater priority means a younger transaction. The only consumer is
/// deadlock victim selection, which aborts the youngest member of a
/// cycle (ties, which cannot occur under unique assignment, break on
/// the greater [`TxnId`]).
///
/// # Example
///
/// ```rust
/// use gridlock_common::Priority;
///
/// let older = Priority::new(1);
/// let younger = Priority::new(2);
/// assert!(younger > older);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Priority(u64);

impl Priority {
    /// Creates a new `Priority` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Priority {
    #[inline]
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_id() {
        let txn = TxnId::new(100);
        assert_eq!(txn.as_u64(), 100);
        assert!(txn.is_valid());
        assert!(!TxnId::INVALID.is_valid());
        assert_eq!(txn.display_name(), "T100");
    }

    #[test]
    fn test_ordering() {
        assert!(TxnId::new(1) < TxnId::new(2));
        assert!(Priority::new(1) < Priority::new(2));
    }

    #[test]
    fn test_debug_sentinel() {
        assert_eq!(format!("{:?}", TxnId::INVALID), "TxnId(INVALID)");
        assert_eq!(format!("{:?}", TxnId::new(7)), "TxnId(7)");
    }
}
