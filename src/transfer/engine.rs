//! Transfer Transaction Engine
//!
//! Moves money between two accounts as one store transaction: lock both rows
//! in `LockOrder`, re-validate under lock, update balances, write the transfer
//! and its two entries, then commit. Any failure rolls the whole transaction
//! back. Store conflicts restart it from scratch up to the retry bound.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::{Amount, LedgerError, TransferTxParams, TransferTxResult};
use crate::store::{LedgerStore, LedgerTx};

use super::{LockOrder, RetryPolicy};

/// Executes transfers against a ledger store
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn LedgerStore>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            timeout: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Deadline for a whole transfer, retries included
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Execute a transfer with no caller-side cancellation
    pub async fn execute_transfer(
        &self,
        params: TransferTxParams,
    ) -> Result<TransferTxResult, LedgerError> {
        self.execute_transfer_with_cancel(params, &CancellationToken::new())
            .await
    }

    /// Execute a transfer, rolling back and returning `Cancelled` if `cancel`
    /// fires while the transaction is open.
    pub async fn execute_transfer_with_cancel(
        &self,
        params: TransferTxParams,
        cancel: &CancellationToken,
    ) -> Result<TransferTxResult, LedgerError> {
        let (amount, order) = validate(&params)?;
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let max_attempts = self.retry.max_attempts;

        for attempt in 1..=max_attempts {
            match self
                .try_transfer(&params, amount, order, cancel, deadline)
                .await
            {
                Ok(result) => {
                    tracing::info!(
                        transfer_id = result.transfer.id,
                        from_account_id = params.from_account_id,
                        to_account_id = params.to_account_id,
                        amount = params.amount,
                        attempt,
                        "Transfer committed"
                    );
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        from_account_id = params.from_account_id,
                        to_account_id = params.to_account_id,
                        delay_ms = delay.as_millis() as u64,
                        "Transaction conflict, retrying (attempt {}/{})",
                        attempt,
                        max_attempts
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(LedgerError::Cancelled),
                        _ = deadline_elapsed(deadline) => return Err(LedgerError::DeadlineExceeded),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) if e.is_retryable() => {
                    tracing::error!(
                        from_account_id = params.from_account_id,
                        to_account_id = params.to_account_id,
                        "Transaction conflict persisted after {} attempts",
                        max_attempts
                    );
                    return Err(LedgerError::Conflict {
                        attempts: max_attempts,
                    });
                }
                Err(e) => {
                    tracing::debug!(
                        from_account_id = params.from_account_id,
                        to_account_id = params.to_account_id,
                        error = %e,
                        "Transfer failed"
                    );
                    return Err(e);
                }
            }
        }

        Err(LedgerError::Conflict {
            attempts: max_attempts,
        })
    }

    /// One attempt: a fresh transaction that re-reads everything it uses
    async fn try_transfer(
        &self,
        params: &TransferTxParams,
        amount: Amount,
        order: LockOrder,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<TransferTxResult, LedgerError> {
        let mut tx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LedgerError::Cancelled),
            _ = deadline_elapsed(deadline) => return Err(LedgerError::DeadlineExceeded),
            tx = self.store.begin() => tx?,
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LedgerError::Cancelled),
            _ = deadline_elapsed(deadline) => Err(LedgerError::DeadlineExceeded),
            result = apply_transfer(tx.as_mut(), params, amount, order) => result,
        };

        match outcome {
            Ok(result) => {
                tx.commit().await?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed; transaction discarded");
                }
                Err(e)
            }
        }
    }
}

/// Checks that need no store access
fn validate(params: &TransferTxParams) -> Result<(Amount, LockOrder), LedgerError> {
    if params.from_account_id <= 0 || params.to_account_id <= 0 {
        return Err(LedgerError::invalid_argument(
            "account ids must be positive",
        ));
    }
    let amount =
        Amount::new(params.amount).map_err(|e| LedgerError::invalid_argument(e.to_string()))?;
    let order = LockOrder::for_pair(params.from_account_id, params.to_account_id)?;
    Ok((amount, order))
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// The locked read-modify-write sequence inside an open transaction
async fn apply_transfer(
    tx: &mut dyn LedgerTx,
    params: &TransferTxParams,
    amount: Amount,
    order: LockOrder,
) -> Result<TransferTxResult, LedgerError> {
    let first = tx
        .lock_account(order.first)
        .await?
        .ok_or(LedgerError::NotFound(order.first))?;
    let second = tx
        .lock_account(order.second)
        .await?
        .ok_or(LedgerError::NotFound(order.second))?;

    let (from_account, to_account) = if first.id == params.from_account_id {
        (first, second)
    } else {
        (second, first)
    };

    let operative = params.currency.unwrap_or(from_account.currency);
    for account in [&from_account, &to_account] {
        if account.currency != operative {
            return Err(LedgerError::CurrencyMismatch {
                account_id: account.id,
                expected: operative,
                found: account.currency,
            });
        }
    }

    if !amount.is_covered_by(from_account.balance) {
        return Err(LedgerError::InsufficientFunds {
            account_id: from_account.id,
            required: amount.value(),
            available: from_account.balance,
        });
    }
    if to_account.balance.checked_add(amount.credit()).is_none() {
        return Err(LedgerError::invalid_argument(format!(
            "amount would overflow balance of account {}",
            to_account.id
        )));
    }

    tracing::debug!(
        first = order.first,
        second = order.second,
        amount = amount.value(),
        "Account rows locked, applying transfer"
    );

    // Balances are written in lock order
    let mut from_updated = None;
    let mut to_updated = None;
    for id in order.as_array() {
        if id == from_account.id {
            from_updated = Some(tx.add_account_balance(id, amount.debit()).await?);
        } else {
            to_updated = Some(tx.add_account_balance(id, amount.credit()).await?);
        }
    }
    let (from_account, to_account) = match (from_updated, to_updated) {
        (Some(from), Some(to)) => (from, to),
        _ => return Err(LedgerError::Internal("balance update skipped".to_string())),
    };

    let transfer = tx
        .create_transfer(from_account.id, to_account.id, amount.value())
        .await?;
    let from_entry = tx.create_entry(from_account.id, amount.debit()).await?;
    let to_entry = tx.create_entry(to_account.id, amount.credit()).await?;

    Ok(TransferTxResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}
