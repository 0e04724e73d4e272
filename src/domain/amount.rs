//! Amount type
//!
//! Domain primitive for the magnitude moved by a transfer, in minor currency
//! units. Validated at construction, so a zero or negative amount cannot reach
//! the engine's write path.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount represents a validated transfer magnitude.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Negation never overflows, so `-amount` is always a valid debit entry
///
/// # Example
/// ```
/// use simple_ledger::domain::Amount;
///
/// let amount = Amount::new(30).unwrap();
/// assert_eq!(amount.value(), 30);
/// assert_eq!(amount.debit(), -30);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(i64),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    pub fn new(value: i64) -> Result<Self, AmountError> {
        if value <= 0 {
            return Err(AmountError::NotPositive(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// Signed amount of the source-side entry
    pub fn debit(&self) -> i64 {
        -self.0
    }

    /// Signed amount of the destination-side entry
    pub fn credit(&self) -> i64 {
        self.0
    }

    /// Whether a balance can cover this amount
    pub fn is_covered_by(&self, balance: i64) -> bool {
        balance >= self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}
