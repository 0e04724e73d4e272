//! simple_ledger Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod store;
pub mod transfer;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{Account, Currency, Entry, LedgerError, Transfer, TransferTxParams, TransferTxResult};
pub use store::{LedgerStore, LedgerTx, MemoryLedgerStore, PgLedgerStore, StoreError};
pub use transfer::{LockOrder, RetryPolicy, TransferEngine};
