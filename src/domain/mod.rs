//! Domain module
//!
//! Core ledger types and the engine's error taxonomy.

pub mod amount;
pub mod currency;
pub mod error;
pub mod models;

pub use amount::{Amount, AmountError};
pub use currency::{Currency, CurrencyError, is_supported_currency};
pub use error::LedgerError;
pub use models::{Account, Entry, NewAccount, Transfer, TransferTxParams, TransferTxResult};
