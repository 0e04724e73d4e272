//! Ledger Store module
//!
//! Capability traits over the durable account/entry/transfer state, plus a
//! PostgreSQL backend and an in-memory double used to drive the transfer
//! engine deterministically in tests.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;

use crate::domain::{Account, Entry, NewAccount, Transfer};

pub use error::{StoreError, StoreResult};
pub use memory::{FailPoint, LedgerSnapshot, MemoryLedgerStore, MemoryLedgerTx};
pub use postgres::{PgLedgerStore, PgLedgerTx};

/// Ledger store abstraction.
///
/// Row CRUD outside a transaction, plus `begin` for the transactional subset
/// the transfer engine composes.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a transaction. Dropping it without `commit` rolls it back.
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>>;

    // === Accounts ===

    /// Create an account; a non-zero opening balance is booked as one entry
    async fn create_account(&self, account: NewAccount) -> StoreResult<Account>;

    async fn get_account(&self, id: i64) -> StoreResult<Option<Account>>;

    /// Accounts ordered by id
    async fn list_accounts(&self, limit: i64, offset: i64) -> StoreResult<Vec<Account>>;

    // === Entries ===

    async fn get_entry(&self, id: i64) -> StoreResult<Option<Entry>>;

    /// Entries of one account ordered by id
    async fn list_entries(&self, account_id: i64, limit: i64, offset: i64)
        -> StoreResult<Vec<Entry>>;

    // === Transfers ===

    async fn get_transfer(&self, id: i64) -> StoreResult<Option<Transfer>>;

    /// Transfers where the account is either source or destination, ordered by id
    async fn list_transfers(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Transfer>>;
}

/// One open store transaction.
///
/// Every write issued through it becomes visible atomically on `commit` and
/// not at all otherwise.
#[async_trait]
pub trait LedgerTx: Send {
    /// Read an account row and hold its exclusive row lock until the
    /// transaction ends. Returns `None` if the account does not exist.
    async fn lock_account(&mut self, id: i64) -> StoreResult<Option<Account>>;

    /// Add a signed delta to an account balance and return the updated row
    async fn add_account_balance(&mut self, id: i64, delta: i64) -> StoreResult<Account>;

    async fn create_transfer(
        &mut self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> StoreResult<Transfer>;

    async fn create_entry(&mut self, account_id: i64, amount: i64) -> StoreResult<Entry>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
