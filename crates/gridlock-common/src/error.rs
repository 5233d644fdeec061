//! Error handling for Gridlock.
//!
//! This module provides the unified error type and result alias used
//! across all Gridlock components.

use thiserror::Error;

use crate::types::TxnId;

/// Errors produced by the Gridlock engine.
///
/// [`GridlockError::Aborted`] is the only condition that can occur at
/// runtime: it is returned from a blocking acquire when the calling
/// transaction was chosen as a deadlock victim, and is always caught at
/// the transaction's own run-loop boundary. The remaining variants are
/// precondition violations rejected when a simulation is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridlockError {
    /// The waiting transaction was chosen as a deadlock victim and must
    /// discard its partial progress and retry.
    #[error("transaction {0} was aborted by deadlock resolution")]
    Aborted(TxnId),

    /// An acquisition plan referenced a resource key that the lock
    /// manager was not constructed with.
    #[error("unknown resource `{0}`")]
    UnknownResource(String),

    /// The simulation configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GridlockError {
    /// Returns true if this is the recoverable abort condition.
    pub fn is_aborted(&self) -> bool {
        matches!(self, GridlockError::Aborted(_))
    }
}

/// Result type alias for Gridlock operations.
pub type GridlockResult<T> = std::result::Result<T, GridlockError>;
