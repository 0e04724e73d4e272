//! In-memory Ledger Store
//!
//! A faithful double of the PostgreSQL store: per-row exclusive locks held for
//! the life of a transaction, writes buffered until commit, store-assigned ids
//! and foreign key checks. Faults and per-operation delays can be injected so
//! engine behavior under failure and contention is testable without a database.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

use crate::domain::{Account, Entry, NewAccount, Transfer};

use super::{LedgerStore, LedgerTx, StoreError, StoreResult};

/// Transactional step at which an injected one-shot failure fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    LockAccount,
    UpdateBalance,
    CreateTransfer,
    CreateEntry,
    Commit,
}

/// Committed contents of the store, for before/after comparisons
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub accounts: Vec<Account>,
    pub entries: Vec<Entry>,
    pub transfers: Vec<Transfer>,
}

impl LedgerSnapshot {
    /// Sum of committed entry amounts for one account
    pub fn entry_sum(&self, account_id: i64) -> i64 {
        self.entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.amount)
            .sum()
    }

    pub fn account(&self, id: i64) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }
}

#[derive(Debug, Default)]
struct State {
    accounts: BTreeMap<i64, Account>,
    entries: BTreeMap<i64, Entry>,
    transfers: BTreeMap<i64, Transfer>,
    next_account_id: i64,
    next_entry_id: i64,
    next_transfer_id: i64,
}

impl State {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    row_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
    lock_log: Mutex<Vec<i64>>,
    fail_point: Mutex<Option<FailPoint>>,
    commit_conflicts: AtomicU32,
    op_delay: Duration,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn row_lock(&self, id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id).or_default().clone()
    }

    fn take_fault(&self, at: FailPoint) -> StoreResult<()> {
        let mut fail_point = self.fail_point.lock().unwrap_or_else(|e| e.into_inner());
        if *fail_point == Some(at) {
            *fail_point = None;
            return Err(StoreError::Unavailable(format!("injected failure at {:?}", at)));
        }
        Ok(())
    }

    async fn pause(&self) {
        if !self.op_delay.is_zero() {
            tokio::time::sleep(self.op_delay).await;
        }
    }
}

/// In-memory ledger store. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before every transactional operation, to force overlap
    pub fn with_op_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                op_delay: delay,
                ..Inner::default()
            }),
        }
    }

    /// Fail the next operation of the given kind with `StoreError::Unavailable`
    pub fn fail_once_at(&self, at: FailPoint) {
        *self.inner.fail_point.lock().unwrap_or_else(|e| e.into_inner()) = Some(at);
    }

    /// Make the next `count` commits abort with `StoreError::Conflict`
    pub fn inject_commit_conflicts(&self, count: u32) {
        self.inner.commit_conflicts.store(count, Ordering::SeqCst);
    }

    /// Account ids in the order their row locks were granted
    pub fn lock_log(&self) -> Vec<i64> {
        self.inner
            .lock_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.inner.state();
        LedgerSnapshot {
            accounts: state.accounts.values().cloned().collect(),
            entries: state.entries.values().cloned().collect(),
            transfers: state.transfers.values().cloned().collect(),
        }
    }
}

fn page<T: Clone>(rows: impl Iterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    rows.skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        Ok(Box::new(MemoryLedgerTx {
            inner: self.inner.clone(),
            held: HashMap::new(),
            balance_deltas: BTreeMap::new(),
            transfers: Vec::new(),
            entries: Vec::new(),
        }))
    }

    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        let mut state = self.inner.state();
        let now = Utc::now();

        let id = State::next_id(&mut state.next_account_id);
        let created = Account {
            id,
            owner: account.owner,
            balance: account.opening_balance,
            currency: account.currency,
            created_at: now,
        };
        state.accounts.insert(id, created.clone());

        if account.opening_balance != 0 {
            let entry_id = State::next_id(&mut state.next_entry_id);
            state.entries.insert(
                entry_id,
                Entry {
                    id: entry_id,
                    account_id: id,
                    amount: account.opening_balance,
                    created_at: now,
                },
            );
        }

        Ok(created)
    }

    async fn get_account(&self, id: i64) -> StoreResult<Option<Account>> {
        Ok(self.inner.state().accounts.get(&id).cloned())
    }

    async fn list_accounts(&self, limit: i64, offset: i64) -> StoreResult<Vec<Account>> {
        let state = self.inner.state();
        Ok(page(state.accounts.values().cloned(), limit, offset))
    }

    async fn get_entry(&self, id: i64) -> StoreResult<Option<Entry>> {
        Ok(self.inner.state().entries.get(&id).cloned())
    }

    async fn list_entries(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Entry>> {
        let state = self.inner.state();
        let rows = state
            .entries
            .values()
            .filter(|e| e.account_id == account_id)
            .cloned();
        Ok(page(rows, limit, offset))
    }

    async fn get_transfer(&self, id: i64) -> StoreResult<Option<Transfer>> {
        Ok(self.inner.state().transfers.get(&id).cloned())
    }

    async fn list_transfers(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Transfer>> {
        let state = self.inner.state();
        let rows = state
            .transfers
            .values()
            .filter(|t| t.from_account_id == account_id || t.to_account_id == account_id)
            .cloned();
        Ok(page(rows, limit, offset))
    }
}

/// An open in-memory transaction. Dropping it discards buffered writes and
/// releases every held row lock.
pub struct MemoryLedgerTx {
    inner: Arc<Inner>,
    held: HashMap<i64, OwnedMutexGuard<()>>,
    balance_deltas: BTreeMap<i64, i64>,
    transfers: Vec<Transfer>,
    entries: Vec<Entry>,
}

impl MemoryLedgerTx {
    /// Committed row overlaid with this transaction's pending balance delta
    fn view(&self, id: i64) -> Option<Account> {
        let mut account = self.inner.state().accounts.get(&id).cloned()?;
        account.balance += self.balance_deltas.get(&id).copied().unwrap_or(0);
        Some(account)
    }

    async fn acquire(&mut self, id: i64) {
        if self.held.contains_key(&id) {
            return;
        }
        let guard = self.inner.row_lock(id).lock_owned().await;
        self.inner
            .lock_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(id);
        self.held.insert(id, guard);
    }

    fn require_account(&self, id: i64) -> StoreResult<()> {
        if self.inner.state().accounts.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::ForeignKeyViolation(format!(
                "account {} does not exist",
                id
            )))
        }
    }
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn lock_account(&mut self, id: i64) -> StoreResult<Option<Account>> {
        self.inner.pause().await;
        self.inner.take_fault(FailPoint::LockAccount)?;

        self.acquire(id).await;
        Ok(self.view(id))
    }

    async fn add_account_balance(&mut self, id: i64, delta: i64) -> StoreResult<Account> {
        self.inner.pause().await;
        self.inner.take_fault(FailPoint::UpdateBalance)?;

        // UPDATE takes the row lock implicitly
        self.acquire(id).await;
        let current = self
            .view(id)
            .ok_or_else(|| StoreError::NotFound(format!("account {}", id)))?;
        let balance = current.balance.checked_add(delta).ok_or_else(|| {
            StoreError::ConstraintViolation(format!("balance of account {} out of range", id))
        })?;

        *self.balance_deltas.entry(id).or_insert(0) += delta;
        Ok(Account { balance, ..current })
    }

    async fn create_transfer(
        &mut self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> StoreResult<Transfer> {
        self.inner.pause().await;
        self.inner.take_fault(FailPoint::CreateTransfer)?;

        self.require_account(from_account_id)?;
        self.require_account(to_account_id)?;
        if amount <= 0 || from_account_id == to_account_id {
            return Err(StoreError::ConstraintViolation(
                "transfers check constraint".to_string(),
            ));
        }

        let id = State::next_id(&mut self.inner.state().next_transfer_id);
        let transfer = Transfer {
            id,
            from_account_id,
            to_account_id,
            amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn create_entry(&mut self, account_id: i64, amount: i64) -> StoreResult<Entry> {
        self.inner.pause().await;
        self.inner.take_fault(FailPoint::CreateEntry)?;

        self.require_account(account_id)?;

        let id = State::next_id(&mut self.inner.state().next_entry_id);
        let entry = Entry {
            id,
            account_id,
            amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.take_fault(FailPoint::Commit)?;

        let conflicts = &self.inner.commit_conflicts;
        if conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Conflict(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }

        let mut state = self.inner.state();
        for (id, delta) in &self.balance_deltas {
            if let Some(account) = state.accounts.get_mut(id) {
                account.balance += delta;
            }
        }
        for transfer in &self.transfers {
            state.transfers.insert(transfer.id, transfer.clone());
        }
        for entry in &self.entries {
            state.entries.insert(entry.id, entry.clone());
        }
        drop(state);

        // Row locks are released when `self.held` drops, after the writes are visible
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
