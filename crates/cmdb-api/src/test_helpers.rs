//! Shared test helpers for the cmdb-api crate.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::{create_test_state, create_test_user, test_router};
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let state = create_test_state().await;
//!     let admin = create_test_user(&state, "root", Role::Admin).await;
//!     let app = test_router(state, admin);
//!     // ... drive app with tower::ServiceExt::oneshot
//! }
//! ```

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Extension, Router,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceExt;

use cmdb_core::db::{create_in_memory_pool, create_user_repository};
use cmdb_core::{AesGcmCipher, Role, SecretCipher, User};

use crate::auth::test_helpers::TestUser;
use crate::routes;
use crate::state::AppState;

/// Boundary used by [`multipart_body`].
pub const TEST_BOUNDARY: &str = "cmdb-test-boundary";

/// Cipher with a fixed key so stored secrets are real ciphertext.
pub fn test_cipher() -> Arc<dyn SecretCipher> {
    Arc::new(AesGcmCipher::new([7u8; 32]))
}

/// Creates an application state over a fresh, migrated in-memory database.
pub async fn create_test_state() -> AppState {
    let pool = create_in_memory_pool()
        .await
        .expect("Failed to create in-memory database");
    AppState::new(pool, test_cipher())
}

/// Inserts a user and returns it with its database id.
pub async fn create_test_user(state: &AppState, username: &str, role: Role) -> User {
    create_user_repository(&state.db)
        .create(&User::new(
            username,
            Some(format!("{}@test.local", username)),
            None,
            role,
        ))
        .await
        .expect("Failed to create test user")
}

/// The full API router with `user` injected as the authenticated caller.
pub fn test_router(state: AppState, user: User) -> Router {
    routes::create_router(state).layer(Extension(TestUser(user)))
}

/// Sends a request and returns status plus raw body.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

/// Sends a request and parses the JSON response body.
pub async fn send_json<T: DeserializeOwned>(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, T) {
    let (status, bytes) = send(app, method, uri, body).await;
    let parsed = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        panic!(
            "invalid JSON ({}) for {}: {}",
            e,
            uri,
            String::from_utf8_lossy(&bytes)
        )
    });
    (status, parsed)
}

/// Builds a `multipart/form-data` body with one `file` part.
pub fn multipart_body(filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            TEST_BOUNDARY, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", TEST_BOUNDARY).as_bytes());
    body
}

/// Posts a single-file multipart upload.
pub async fn upload(
    app: &Router,
    uri: &str,
    filename: &str,
    content: &[u8],
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", TEST_BOUNDARY),
        )
        .body(Body::from(multipart_body(filename, content)))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (
        status,
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null),
    )
}
