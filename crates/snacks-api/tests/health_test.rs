//! Integration tests for the health endpoint.

mod common;

use axum::http::StatusCode;
use snacks_test_support::InMemoryAssetStore;

#[tokio::test]
async fn test_health_returns_200_with_status_ok() {
    let app = common::build_test_app(InMemoryAssetStore::new());

    let (status, json) = app.get_json("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let app = common::build_test_app(InMemoryAssetStore::new());

    let (status, _) = app.get_json("/api/v1/nonexistent").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
