//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::Request,
    response::Response,
    Router,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::OnceCell;

use simple_ledger::api::{self, AppState};
use simple_ledger::{db, MemoryLedgerStore, RetryPolicy, TransferEngine};

static SCHEMA_READY: OnceCell<()> = OnceCell::const_new();

/// Connect to the test database and make sure the schema exists.
///
/// Returns `None` when `DATABASE_URL` is not set so callers can skip.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set, skipping PostgreSQL test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    SCHEMA_READY
        .get_or_init(|| async {
            db::apply_schema(&pool)
                .await
                .expect("Failed to apply schema");
        })
        .await;

    Some(pool)
}

/// Router over a fresh in-memory store, plus a handle to that store
pub fn memory_app() -> (Router, MemoryLedgerStore) {
    let store = MemoryLedgerStore::new();
    let engine = TransferEngine::new(Arc::new(store.clone()))
        .with_retry_policy(RetryPolicy::new(5, std::time::Duration::from_millis(1)));
    let app = api::build_router(AppState::new(Arc::new(store.clone()), engine));
    (app, store)
}

/// Unique owner name so tests sharing a database never collide
pub fn random_owner() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("owner_{}", suffix.to_lowercase())
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
