//! API Integration Tests
//!
//! Drive the full router (middleware included) over the in-memory store.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::util::ServiceExt;

mod common;

use common::{body_json, get_request, json_request, memory_app};

async fn create_account(app: &Router, owner: &str, currency: &str, balance: i64) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/accounts",
            json!({ "owner": owner, "currency": currency, "balance": balance }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED, "account creation failed");
    body_json(response).await
}

async fn post_transfer(app: &Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/transfers", body))
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn test_health_check_sets_request_id() {
    let (app, _) = memory_app();

    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .expect("x-request-id missing");
    assert!(uuid::Uuid::parse_str(&request_id).is_ok());

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_supplied_request_id_is_echoed() {
    let (app, _) = memory_app();

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "client-req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.headers()["x-request-id"], "client-req-42");
}

#[tokio::test]
async fn test_account_create_get_list() {
    let (app, _) = memory_app();

    let created = create_account(&app, "alice", "USD", 100).await;
    assert_eq!(created["owner"], "alice");
    assert_eq!(created["currency"], "USD");
    assert_eq!(created["balance"], 100);
    let id = created["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(get_request(&format!("/accounts/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, created);

    create_account(&app, "bob", "EUR", 0).await;
    let response = app
        .clone()
        .oneshot(get_request("/accounts?limit=10&offset=0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["accounts"].as_array().unwrap().len(), 2);

    // Opening balance is booked as an entry
    let response = app
        .oneshot(get_request(&format!("/accounts/{}/entries", id)))
        .await
        .unwrap();
    let body = body_json(response).await;
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["amount"], 100);
}

#[tokio::test]
async fn test_account_validation() {
    let (app, _) = memory_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/accounts",
            json!({ "owner": "alice", "currency": "XYZ" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "unsupported_currency");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/accounts",
            json!({ "owner": "  ", "currency": "USD" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/accounts",
            json!({ "owner": "alice", "currency": "USD", "balance": -5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(get_request("/accounts/999"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error_code"], "account_not_found");

    let response = app
        .oneshot(get_request("/accounts?limit=1000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transfer_e2e() {
    let (app, store) = memory_app();

    let a = create_account(&app, "alice", "USD", 100).await;
    let b = create_account(&app, "bob", "USD", 0).await;
    let (a_id, b_id) = (a["id"].as_i64().unwrap(), b["id"].as_i64().unwrap());

    let (status, result) = post_transfer(
        &app,
        json!({
            "from_account_id": a_id,
            "to_account_id": b_id,
            "amount": 30,
            "currency": "USD"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "transfer failed: {}", result);
    assert_eq!(result["transfer"]["amount"], 30);
    assert_eq!(result["from_account"]["balance"], 70);
    assert_eq!(result["to_account"]["balance"], 30);
    assert_eq!(result["from_entry"]["amount"], -30);
    assert_eq!(result["to_entry"]["amount"], 30);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.account(a_id).unwrap().balance, 70);
    assert_eq!(snapshot.account(b_id).unwrap().balance, 30);

    // Read back the transfer and its entries
    let transfer_id = result["transfer"]["id"].as_i64().unwrap();
    let response = app
        .clone()
        .oneshot(get_request(&format!("/transfers/{}", transfer_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, result["transfer"]);

    let entry_id = result["to_entry"]["id"].as_i64().unwrap();
    let response = app
        .clone()
        .oneshot(get_request(&format!("/entries/{}", entry_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["account_id"], b_id);

    for account_id in [a_id, b_id] {
        let response = app
            .clone()
            .oneshot(get_request(&format!("/transfers?account_id={}", account_id)))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["transfers"].as_array().unwrap().len(), 1);
    }

    let response = app
        .oneshot(get_request(&format!("/accounts/{}/entries", a_id)))
        .await
        .unwrap();
    let body = body_json(response).await;
    let sum: i64 = body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["amount"].as_i64().unwrap())
        .sum();
    assert_eq!(sum, 70);
}

#[tokio::test]
async fn test_transfer_rejections() {
    let (app, store) = memory_app();

    let a = create_account(&app, "alice", "USD", 50).await["id"].as_i64().unwrap();
    let b = create_account(&app, "bob", "USD", 0).await["id"].as_i64().unwrap();
    let eur = create_account(&app, "carol", "EUR", 50).await["id"].as_i64().unwrap();

    let cases = vec![
        (
            json!({ "from_account_id": a, "to_account_id": b, "amount": 10, "currency": "XYZ" }),
            StatusCode::BAD_REQUEST,
            "unsupported_currency",
        ),
        (
            json!({ "from_account_id": a, "to_account_id": a, "amount": 10, "currency": "USD" }),
            StatusCode::BAD_REQUEST,
            "invalid_request",
        ),
        (
            json!({ "from_account_id": a, "to_account_id": b, "amount": 0, "currency": "USD" }),
            StatusCode::BAD_REQUEST,
            "invalid_request",
        ),
        (
            json!({ "from_account_id": a, "to_account_id": 999, "amount": 10, "currency": "USD" }),
            StatusCode::NOT_FOUND,
            "account_not_found",
        ),
        (
            json!({ "from_account_id": a, "to_account_id": eur, "amount": 10, "currency": "USD" }),
            StatusCode::BAD_REQUEST,
            "currency_mismatch",
        ),
        (
            json!({ "from_account_id": a, "to_account_id": b, "amount": 10, "currency": "EUR" }),
            StatusCode::BAD_REQUEST,
            "currency_mismatch",
        ),
        (
            json!({ "from_account_id": a, "to_account_id": b, "amount": 51, "currency": "USD" }),
            StatusCode::BAD_REQUEST,
            "insufficient_funds",
        ),
    ];

    for (body, status, error_code) in cases {
        let (got_status, got_body) = post_transfer(&app, body.clone()).await;
        assert_eq!(got_status, status, "request {}", body);
        assert_eq!(got_body["error_code"], error_code, "request {}", body);
    }

    // Nothing was written
    let snapshot = store.snapshot();
    assert!(snapshot.transfers.is_empty());
    assert_eq!(snapshot.account(a).unwrap().balance, 50);
    assert_eq!(snapshot.account(b).unwrap().balance, 0);
}

#[tokio::test]
async fn test_malformed_transfer_body() {
    let (app, _) = memory_app();

    let request = Request::builder()
        .method("POST")
        .uri("/transfers")
        .header("content-type", "application/json")
        .body(Body::from("{\"from_account_id\": 1,"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "invalid_request");

    let (status, body) = post_transfer(
        &app,
        json!({ "from_account_id": "one", "to_account_id": 2, "amount": 10, "currency": "USD" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");
}

#[tokio::test]
async fn test_unknown_transfer_and_entry() {
    let (app, _) = memory_app();

    let response = app
        .clone()
        .oneshot(get_request("/transfers/42"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error_code"], "transfer_not_found");

    let response = app.oneshot(get_request("/entries/42")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error_code"], "entry_not_found");
}
