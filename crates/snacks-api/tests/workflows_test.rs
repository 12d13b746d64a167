//! Integration tests for the workflow routes.

mod common;

use axum::http::StatusCode;
use snacks_test_support::{InMemoryAssetStore, test_contracts};

#[tokio::test]
async fn test_mint_and_bind_is_accepted_then_completes() {
    // Arrange
    let mut app = common::build_test_app(InMemoryAssetStore::new());

    // Act
    let (status, json) = app
        .post_json(
            "/api/v1/workflows/mint-and-bind",
            &serde_json::json!({ "wallet_address": common::WALLET }),
        )
        .await;

    // Assert
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "pending");
    let key = json["idempotency_key"].as_str().unwrap().to_owned();
    assert!(key.starts_with("mint_and_bind:"));

    app.drain().await;

    let (status, json) = app.get_json(&format!("/api/v1/workflows/{key}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert!(json.get("reason").is_none());
}

#[tokio::test]
async fn test_duplicate_requests_share_a_key_and_submit_once() {
    let mut app = common::build_test_app(InMemoryAssetStore::new());
    let upper = common::WALLET.to_uppercase().replacen("0X", "0x", 1);

    let (_, first) = app
        .post_json(
            "/api/v1/workflows/mint-and-bind",
            &serde_json::json!({ "wallet_address": common::WALLET }),
        )
        .await;
    let (_, second) = app
        .post_json(
            "/api/v1/workflows/mint-and-bind",
            &serde_json::json!({ "wallet_address": upper }),
        )
        .await;
    app.drain().await;

    assert_eq!(first["idempotency_key"], second["idempotency_key"]);
    assert_eq!(app.chain.sent_to(test_contracts().asset).len(), 1);
    assert_eq!(app.chain.sent_to(test_contracts().registry).len(), 1);
}

#[tokio::test]
async fn test_malformed_wallet_returns_400() {
    let app = common::build_test_app(InMemoryAssetStore::new());

    let (status, json) = app
        .post_json(
            "/api/v1/workflows/mint-and-bind",
            &serde_json::json!({ "wallet_address": "not-a-wallet" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_blank_restaurant_returns_400() {
    let app = common::build_test_app(InMemoryAssetStore::new());

    let (status, json) = app
        .post_json(
            "/api/v1/workflows/attest-and-evolve",
            &serde_json::json!({ "wallet_address": common::WALLET, "restaurant_id": "  " }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_unknown_workflow_returns_404() {
    let app = common::build_test_app(InMemoryAssetStore::new());

    let (status, json) = app.get_json("/api/v1/workflows/mint_and_bind:nope").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn test_checkin_before_mint_reports_failure_reason() {
    let store = InMemoryAssetStore::new().with_restaurant(common::restaurant("le-comptoir", "poap/12"));
    let mut app = common::build_test_app(store);

    let (status, json) = app
        .post_json(
            "/api/v1/workflows/attest-and-evolve",
            &serde_json::json!({ "wallet_address": common::WALLET, "restaurant_id": "le-comptoir" }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let key = json["idempotency_key"].as_str().unwrap().to_owned();
    app.drain().await;

    let (status, json) = app.get_json(&format!("/api/v1/workflows/{key}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "failed");
    assert!(json["reason"].as_str().unwrap().contains("cannot take checkins"));
    assert!(app.chain.sent().is_empty());
}
