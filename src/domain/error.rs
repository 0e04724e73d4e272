//! Ledger Error Types
//!
//! Typed failures of the transfer engine. These are independent of the web
//! layer; the gateway maps them to HTTP responses.

use thiserror::Error;

use super::Currency;

/// Transfer engine errors.
///
/// Only `Conflict` is ever retried, and only by the engine itself. Everything
/// else is returned to the caller after a full rollback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed amount, self-transfer or missing identifier
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced account does not exist
    #[error("Account not found: {0}")]
    NotFound(i64),

    /// Accounts (or the requested operative currency) disagree
    #[error("Currency mismatch: account {account_id} uses {found}, expected {expected}")]
    CurrencyMismatch {
        account_id: i64,
        expected: Currency,
        found: Currency,
    },

    /// Source balance cannot cover the amount
    #[error("Insufficient funds in account {account_id}: required {required}, available {available}")]
    InsufficientFunds {
        account_id: i64,
        required: i64,
        available: i64,
    },

    /// Transient serialization conflict or deadlock abort that outlived the retry bound
    #[error("Transaction conflict after {attempts} attempts")]
    Conflict { attempts: u32 },

    /// Store connectivity or constraint failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Caller cancelled the transfer while its transaction was open
    #[error("Transfer cancelled")]
    Cancelled,

    /// Configured transfer deadline elapsed
    #[error("Transfer deadline exceeded")]
    DeadlineExceeded,
}

impl LedgerError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Check if this is a caller error (input must change before retrying)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::NotFound(_)
                | Self::CurrencyMismatch { .. }
                | Self::InsufficientFunds { .. }
        )
    }

    /// Check if the engine may retry the whole transaction
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
