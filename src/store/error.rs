//! Ledger Store Errors
//!
//! Store-agnostic failure kinds. Backends classify their native errors into
//! these so the engine never matches on a vendor error code.

use crate::domain::LedgerError;

/// Errors that can occur in a ledger store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Row addressed by an update does not exist
    #[error("Row not found: {0}")]
    NotFound(String),

    /// Transient concurrency abort (serialization failure or deadlock victim)
    #[error("Concurrency conflict: {0}")]
    Conflict(String),

    /// Entry or transfer references a missing account
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Any other integrity or range check rejected the write
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Persisted row could not be mapped to a domain value
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// Store unreachable (pool exhausted, connection lost, injected fault)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Unclassified database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => LedgerError::Conflict { attempts: 1 },
            other => LedgerError::Internal(other.to_string()),
        }
    }
}
