//! Health check endpoint integration tests.

use axum::http::StatusCode;
use serde_json::Value;

use super::common::{create_test_router, get_request, send_request, send_request_raw};

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let (app, _state) = create_test_router().await;

    let (status, body): (StatusCode, Value) = send_request(app, get_request("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

/// Health endpoints are reachable without an API key.
#[tokio::test]
async fn test_health_endpoints_no_auth_required() {
    for endpoint in ["/health", "/health/detailed", "/live", "/ready"] {
        let (app, _) = create_test_router().await;
        let (status, _) = send_request_raw(app, get_request(endpoint)).await;
        assert_eq!(status, StatusCode::OK, "{}", endpoint);
    }
}

#[tokio::test]
async fn test_detailed_health_reports_encryption() {
    let (app, _state) = create_test_router().await;

    let (status, body): (StatusCode, Value) =
        send_request(app, get_request("/health/detailed")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["components"]["encryption_enabled"], true);
    assert_eq!(body["components"]["cipher"], "aes-256-gcm");
}

#[tokio::test]
async fn test_ready_fails_after_pool_closed() {
    let (app, state) = create_test_router().await;
    state.db.close().await;

    let (status, _) = send_request_raw(app, get_request("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
