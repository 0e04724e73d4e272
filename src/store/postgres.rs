//! PostgreSQL Ledger Store
//!
//! Runs at READ COMMITTED with explicit `SELECT ... FOR NO KEY UPDATE` row locks.
//! SQLSTATE codes are classified into `StoreError` here and nowhere else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{Account, Entry, NewAccount, Transfer};

use super::{LedgerStore, LedgerTx, StoreError, StoreResult};

/// serialization_failure
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
/// deadlock_detected
const SQLSTATE_DEADLOCK_DETECTED: &str = "40P01";
/// foreign_key_violation
const SQLSTATE_FOREIGN_KEY_VIOLATION: &str = "23503";
/// numeric_value_out_of_range
const SQLSTATE_NUMERIC_OUT_OF_RANGE: &str = "22003";

type AccountRow = (i64, String, i64, String, DateTime<Utc>);
type EntryRow = (i64, i64, i64, DateTime<Utc>);
type TransferRow = (i64, i64, i64, i64, DateTime<Utc>);

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let message = db_err.message().to_string();
            match db_err.code().as_deref() {
                Some(SQLSTATE_SERIALIZATION_FAILURE) | Some(SQLSTATE_DEADLOCK_DETECTED) => {
                    return StoreError::Conflict(message);
                }
                Some(SQLSTATE_FOREIGN_KEY_VIOLATION) => {
                    return StoreError::ForeignKeyViolation(message);
                }
                Some(SQLSTATE_NUMERIC_OUT_OF_RANGE) => {
                    return StoreError::ConstraintViolation(message);
                }
                Some(code) if code.starts_with("23") => {
                    return StoreError::ConstraintViolation(message);
                }
                _ => {}
            }
        }

        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

fn account_from_row((id, owner, balance, currency, created_at): AccountRow) -> StoreResult<Account> {
    let currency = currency
        .parse()
        .map_err(|e| StoreError::InvalidData(format!("account {}: {}", id, e)))?;
    Ok(Account {
        id,
        owner,
        balance,
        currency,
        created_at,
    })
}

fn entry_from_row((id, account_id, amount, created_at): EntryRow) -> Entry {
    Entry {
        id,
        account_id,
        amount,
        created_at,
    }
}

fn transfer_from_row(
    (id, from_account_id, to_account_id, amount, created_at): TransferRow,
) -> Transfer {
    Transfer {
        id,
        from_account_id,
        to_account_id,
        amount,
        created_at,
    }
}

/// Ledger store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        let mut tx = self.pool.begin().await?;

        let row: AccountRow = sqlx::query_as(
            r#"
            INSERT INTO accounts (owner, balance, currency)
            VALUES ($1, $2, $3)
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(&account.owner)
        .bind(account.opening_balance)
        .bind(account.currency.code())
        .fetch_one(&mut *tx)
        .await?;
        let created = account_from_row(row)?;

        if account.opening_balance != 0 {
            sqlx::query("INSERT INTO entries (account_id, amount) VALUES ($1, $2)")
                .bind(created.id)
                .bind(account.opening_balance)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn get_account(&self, id: i64) -> StoreResult<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(
            "SELECT id, owner, balance, currency, created_at FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(account_from_row).transpose()
    }

    async fn list_accounts(&self, limit: i64, offset: i64) -> StoreResult<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(account_from_row).collect()
    }

    async fn get_entry(&self, id: i64) -> StoreResult<Option<Entry>> {
        let row: Option<EntryRow> =
            sqlx::query_as("SELECT id, account_id, amount, created_at FROM entries WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(entry_from_row))
    }

    async fn list_entries(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Entry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, amount, created_at
            FROM entries
            WHERE account_id = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(entry_from_row).collect())
    }

    async fn get_transfer(&self, id: i64) -> StoreResult<Option<Transfer>> {
        let row: Option<TransferRow> = sqlx::query_as(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(transfer_from_row))
    }

    async fn list_transfers(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Transfer>> {
        let rows: Vec<TransferRow> = sqlx::query_as(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE from_account_id = $1 OR to_account_id = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(transfer_from_row).collect())
    }
}

/// An open PostgreSQL transaction. Dropping it rolls back.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_account(&mut self, id: i64) -> StoreResult<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE id = $1
            FOR NO KEY UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(account_from_row).transpose()
    }

    async fn add_account_balance(&mut self, id: i64, delta: i64) -> StoreResult<Account> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            UPDATE accounts
            SET balance = balance + $2
            WHERE id = $1
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;

        let row = row.ok_or_else(|| StoreError::NotFound(format!("account {}", id)))?;
        account_from_row(row)
    }

    async fn create_transfer(
        &mut self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> StoreResult<Transfer> {
        let row: TransferRow = sqlx::query_as(
            r#"
            INSERT INTO transfers (from_account_id, to_account_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, from_account_id, to_account_id, amount, created_at
            "#,
        )
        .bind(from_account_id)
        .bind(to_account_id)
        .bind(amount)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(transfer_from_row(row))
    }

    async fn create_entry(&mut self, account_id: i64, amount: i64) -> StoreResult<Entry> {
        let row: EntryRow = sqlx::query_as(
            r#"
            INSERT INTO entries (account_id, amount)
            VALUES ($1, $2)
            RETURNING id, account_id, amount, created_at
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(entry_from_row(row))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
