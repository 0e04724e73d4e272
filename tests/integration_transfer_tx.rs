//! PostgreSQL Transfer Integration Tests
//!
//! Run against `DATABASE_URL`; each test is skipped when it is not set.

use std::sync::Arc;
use std::time::Duration;

use simple_ledger::domain::NewAccount;
use simple_ledger::{
    Account, Currency, LedgerError, LedgerStore, LedgerTx, PgLedgerStore, RetryPolicy, StoreError,
    TransferEngine, TransferTxParams,
};

mod common;

use common::{random_owner, setup_test_db};

async fn open_account(store: &PgLedgerStore, currency: Currency, balance: i64) -> Account {
    store
        .create_account(NewAccount::new(random_owner(), currency).with_opening_balance(balance))
        .await
        .expect("Failed to create account")
}

async fn balance(store: &PgLedgerStore, id: i64) -> i64 {
    store.get_account(id).await.unwrap().unwrap().balance
}

async fn entry_sum(store: &PgLedgerStore, id: i64) -> i64 {
    store
        .list_entries(id, 1000, 0)
        .await
        .unwrap()
        .iter()
        .map(|e| e.amount)
        .sum()
}

fn engine(store: &Arc<PgLedgerStore>) -> TransferEngine {
    TransferEngine::new(store.clone())
        .with_retry_policy(RetryPolicy::new(10, Duration::from_millis(5)))
        .with_timeout(Some(Duration::from_secs(10)))
}

#[tokio::test]
async fn test_pg_transfer_tx() {
    let Some(pool) = setup_test_db().await else {
        return;
    };
    let store = Arc::new(PgLedgerStore::new(pool));
    let a = open_account(&store, Currency::Usd, 100).await;
    let b = open_account(&store, Currency::Usd, 0).await;

    let result = engine(&store)
        .execute_transfer(TransferTxParams::new(a.id, b.id, 30).with_currency(Currency::Usd))
        .await
        .unwrap();

    assert_eq!(result.transfer.from_account_id, a.id);
    assert_eq!(result.transfer.to_account_id, b.id);
    assert_eq!(result.transfer.amount, 30);
    assert_eq!(result.from_entry.amount, -30);
    assert_eq!(result.to_entry.amount, 30);
    assert_eq!(result.from_account.balance, 70);
    assert_eq!(result.to_account.balance, 30);

    assert_eq!(
        store.get_transfer(result.transfer.id).await.unwrap(),
        Some(result.transfer.clone())
    );
    assert_eq!(
        store.get_entry(result.to_entry.id).await.unwrap(),
        Some(result.to_entry.clone())
    );

    for account_id in [a.id, b.id] {
        let transfers = store.list_transfers(account_id, 10, 0).await.unwrap();
        assert_eq!(transfers, vec![result.transfer.clone()]);
    }

    assert_eq!(entry_sum(&store, a.id).await, 70);
    assert_eq!(entry_sum(&store, b.id).await, 30);
}

#[tokio::test]
async fn test_pg_rejected_transfer_writes_nothing() {
    let Some(pool) = setup_test_db().await else {
        return;
    };
    let store = Arc::new(PgLedgerStore::new(pool));
    let a = open_account(&store, Currency::Usd, 20).await;
    let b = open_account(&store, Currency::Usd, 0).await;
    let c = open_account(&store, Currency::Cad, 0).await;

    let err = engine(&store)
        .execute_transfer(TransferTxParams::new(a.id, b.id, 21))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

    let err = engine(&store)
        .execute_transfer(TransferTxParams::new(a.id, c.id, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::CurrencyMismatch { account_id, .. } if account_id == c.id));

    assert_eq!(balance(&store, a.id).await, 20);
    assert_eq!(balance(&store, b.id).await, 0);
    assert!(store.list_transfers(a.id, 10, 0).await.unwrap().is_empty());
    assert_eq!(store.list_entries(a.id, 10, 0).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pg_concurrent_transfers() {
    let Some(pool) = setup_test_db().await else {
        return;
    };
    let store = Arc::new(PgLedgerStore::new(pool));
    let a = open_account(&store, Currency::Usd, 1000).await;
    let b = open_account(&store, Currency::Usd, 0).await;
    let engine = engine(&store);

    let n = 10;
    let amount = 10;
    let handles: Vec<_> = (0..n)
        .map(|_| {
            let engine = engine.clone();
            let (from, to) = (a.id, b.id);
            tokio::spawn(async move {
                engine
                    .execute_transfer(TransferTxParams::new(from, to, amount))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(balance(&store, a.id).await, 1000 - n * amount);
    assert_eq!(balance(&store, b.id).await, n * amount);
    assert_eq!(entry_sum(&store, a.id).await, 1000 - n * amount);
    assert_eq!(entry_sum(&store, b.id).await, n * amount);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pg_opposing_transfers_do_not_deadlock() {
    let Some(pool) = setup_test_db().await else {
        return;
    };
    let store = Arc::new(PgLedgerStore::new(pool));
    let a = open_account(&store, Currency::Usd, 100).await;
    let b = open_account(&store, Currency::Usd, 100).await;
    let engine = engine(&store);

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let engine = engine.clone();
            let (from, to) = if i % 2 == 0 { (a.id, b.id) } else { (b.id, a.id) };
            tokio::spawn(async move {
                engine
                    .execute_transfer(TransferTxParams::new(from, to, 10))
                    .await
            })
        })
        .collect();

    let outcome = tokio::time::timeout(Duration::from_secs(30), async {
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    })
    .await;
    assert!(outcome.is_ok(), "opposing transfers did not finish");

    assert_eq!(balance(&store, a.id).await, 100);
    assert_eq!(balance(&store, b.id).await, 100);
}

#[tokio::test]
async fn test_pg_foreign_key_violation_is_classified() {
    let Some(pool) = setup_test_db().await else {
        return;
    };
    let store = PgLedgerStore::new(pool);

    let mut tx = store.begin().await.unwrap();
    let err = tx.create_entry(i64::MAX, 10).await.unwrap_err();
    assert!(matches!(err, StoreError::ForeignKeyViolation(_)), "{:?}", err);
    tx.rollback().await.unwrap();
}
