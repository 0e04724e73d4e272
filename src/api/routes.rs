//! API Routes
//!
//! HTTP endpoint definitions.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Account, Currency, Entry, LedgerError, NewAccount, Transfer, TransferTxParams,
    TransferTxResult,
};
use crate::error::AppError;
use crate::store::LedgerStore;
use crate::transfer::TransferEngine;

/// Page size cap for list endpoints
const MAX_PAGE_SIZE: i64 = 100;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub engine: TransferEngine,
}

impl AppState {
    pub fn new(store: Arc<dyn LedgerStore>, engine: TransferEngine) -> Self {
        Self { store, engine }
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub owner: String,
    pub currency: String,
    #[serde(default)]
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransfersQuery {
    pub account_id: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct AccountsListResponse {
    pub accounts: Vec<Account>,
}

#[derive(Debug, Serialize)]
pub struct EntriesListResponse {
    pub account_id: i64,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Serialize)]
pub struct TransfersListResponse {
    pub account_id: i64,
    pub transfers: Vec<Transfer>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/accounts", post(create_account).get(list_accounts))
        .route("/accounts/:account_id", get(get_account))
        .route("/accounts/:account_id/entries", get(list_account_entries))
        .route("/entries/:entry_id", get(get_entry))
        .route("/transfers", post(create_transfer).get(list_transfers))
        .route("/transfers/:transfer_id", get(get_transfer))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

// =========================================================================
// Accounts
// =========================================================================

/// Create a new account
async fn create_account(
    State(state): State<AppState>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let Json(request) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let owner = request.owner.trim();
    if owner.is_empty() {
        return Err(AppError::InvalidRequest("owner must not be empty".to_string()));
    }
    let currency = parse_currency(&request.currency)?;
    if request.balance < 0 {
        return Err(AppError::InvalidRequest(
            "opening balance must not be negative".to_string(),
        ));
    }

    let account = state
        .store
        .create_account(NewAccount::new(owner, currency).with_opening_balance(request.balance))
        .await?;

    tracing::info!(
        account_id = account.id,
        currency = %account.currency,
        opening_balance = account.balance,
        "Account created"
    );

    Ok((StatusCode::CREATED, Json(account)))
}

/// Get account by ID
async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
) -> Result<Json<Account>, AppError> {
    let account = state
        .store
        .get_account(account_id)
        .await?
        .ok_or(AppError::AccountNotFound(account_id))?;

    Ok(Json(account))
}

/// List accounts
async fn list_accounts(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<AccountsListResponse>, AppError> {
    let Query(page) = query.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    validate_page(page.limit, page.offset)?;

    let accounts = state.store.list_accounts(page.limit, page.offset).await?;

    Ok(Json(AccountsListResponse { accounts }))
}

// =========================================================================
// Entries
// =========================================================================

/// List entries of one account
async fn list_account_entries(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<EntriesListResponse>, AppError> {
    let Query(page) = query.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    validate_page(page.limit, page.offset)?;

    if state.store.get_account(account_id).await?.is_none() {
        return Err(AppError::AccountNotFound(account_id));
    }

    let entries = state
        .store
        .list_entries(account_id, page.limit, page.offset)
        .await?;

    Ok(Json(EntriesListResponse {
        account_id,
        entries,
    }))
}

/// Get entry by ID
async fn get_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<i64>,
) -> Result<Json<Entry>, AppError> {
    let entry = state
        .store
        .get_entry(entry_id)
        .await?
        .ok_or(AppError::EntryNotFound(entry_id))?;

    Ok(Json(entry))
}

// =========================================================================
// Transfers
// =========================================================================

/// Execute a transfer
async fn create_transfer(
    State(state): State<AppState>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<TransferTxResult>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let currency = parse_currency(&request.currency)?;
    if request.from_account_id <= 0 || request.to_account_id <= 0 {
        return Err(AppError::InvalidRequest(
            "account ids must be positive".to_string(),
        ));
    }
    if request.amount <= 0 {
        return Err(AppError::InvalidRequest(
            "amount must be greater than zero".to_string(),
        ));
    }
    if request.from_account_id == request.to_account_id {
        return Err(AppError::InvalidRequest(
            "cannot transfer to the same account".to_string(),
        ));
    }

    // Early rejection only; the engine repeats these checks under lock
    for account_id in [request.from_account_id, request.to_account_id] {
        valid_account(&state, account_id, currency).await?;
    }

    let params = TransferTxParams::new(
        request.from_account_id,
        request.to_account_id,
        request.amount,
    )
    .with_currency(currency);

    let result = state.engine.execute_transfer(params).await?;

    Ok(Json(result))
}

/// Get transfer by ID
async fn get_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<i64>,
) -> Result<Json<Transfer>, AppError> {
    let transfer = state
        .store
        .get_transfer(transfer_id)
        .await?
        .ok_or(AppError::TransferNotFound(transfer_id))?;

    Ok(Json(transfer))
}

/// List transfers where the account is either side
async fn list_transfers(
    State(state): State<AppState>,
    query: Result<Query<TransfersQuery>, QueryRejection>,
) -> Result<Json<TransfersListResponse>, AppError> {
    let Query(query) = query.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    validate_page(query.limit, query.offset)?;

    let transfers = state
        .store
        .list_transfers(query.account_id, query.limit, query.offset)
        .await?;

    Ok(Json(TransfersListResponse {
        account_id: query.account_id,
        transfers,
    }))
}

// =========================================================================
// Validation helpers
// =========================================================================

fn parse_currency(code: &str) -> Result<Currency, AppError> {
    code.parse()
        .map_err(|_| AppError::UnsupportedCurrency(code.to_string()))
}

fn validate_page(limit: i64, offset: i64) -> Result<(), AppError> {
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppError::InvalidRequest(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    if offset < 0 {
        return Err(AppError::InvalidRequest(
            "offset must not be negative".to_string(),
        ));
    }
    Ok(())
}

async fn valid_account(
    state: &AppState,
    account_id: i64,
    currency: Currency,
) -> Result<Account, AppError> {
    let account = state
        .store
        .get_account(account_id)
        .await?
        .ok_or(AppError::AccountNotFound(account_id))?;

    if account.currency != currency {
        return Err(LedgerError::CurrencyMismatch {
            account_id,
            expected: currency,
            found: account.currency,
        }
        .into());
    }

    Ok(account)
}
