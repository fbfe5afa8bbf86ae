//! Common test utilities for integration tests.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceExt;

use cmdb_api::{routes, AppState};
use cmdb_core::db::{create_api_key_repository, create_in_memory_pool, create_user_repository};
use cmdb_core::{AesGcmCipher, ApiKey, Role, User};

pub const BOUNDARY: &str = "integration-boundary";

/// Creates state over a fresh in-memory database.
pub async fn create_test_state() -> AppState {
    let pool = create_in_memory_pool()
        .await
        .expect("Failed to create in-memory database");
    AppState::new(pool, Arc::new(AesGcmCipher::new([42u8; 32])))
}

/// Creates the API router and its state.
pub async fn create_test_router() -> (Router, AppState) {
    let state = create_test_state().await;
    (routes::create_router(state.clone()), state)
}

/// Inserts a user and issues an API key for it. Returns the raw key.
pub async fn create_user_with_key(state: &AppState, username: &str, role: Role) -> (User, String) {
    let user = create_user_repository(&state.db)
        .create(&User::new(username, None, None, role))
        .await
        .expect("Failed to create user");

    let (api_key, raw) = ApiKey::new(user.id, "integration");
    create_api_key_repository(&state.db)
        .create(&api_key)
        .await
        .expect("Failed to store API key");
    (user, raw)
}

/// Builds a GET request.
pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Builds a request carrying a bearer key and an optional JSON body.
pub fn authed_request(
    method: Method,
    uri: &str,
    key: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", key));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Builds a single-file multipart upload carrying a bearer key.
pub fn upload_request(uri: &str, key: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        BOUNDARY, filename
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", key))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Sends a request and returns status plus raw body.
pub async fn send_request_raw(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

/// Sends a request and parses the JSON body.
pub async fn send_request<T: DeserializeOwned>(
    app: Router,
    request: Request<Body>,
) -> (StatusCode, T) {
    let (status, body) = send_request_raw(app, request).await;
    let parsed = serde_json::from_slice(&body).unwrap_or_else(|e| {
        panic!(
            "invalid JSON ({}): {}",
            e,
            String::from_utf8_lossy(&body)
        )
    });
    (status, parsed)
}
