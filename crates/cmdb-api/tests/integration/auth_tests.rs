//! Bearer API key authentication tests.

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use cmdb_core::db::create_user_repository;
use cmdb_core::{Role, UserUpdate};

use super::common::{
    authed_request, create_test_router, create_user_with_key, get_request, send_request,
};

#[tokio::test]
async fn test_missing_key_is_unauthorized() {
    let (app, _state) = create_test_router().await;

    let (status, body): (StatusCode, Value) =
        send_request(app, get_request("/api/v1/tags")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_wrong_secret_is_unauthorized() {
    let (app, state) = create_test_router().await;
    let (_, raw) = create_user_with_key(&state, "ops", Role::User).await;
    let tampered = format!("{}x", raw);

    let (status, _): (StatusCode, Value) = send_request(
        app,
        authed_request(Method::GET, "/api/v1/tags", &tampered, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_valid_key_reaches_stores() {
    let (app, state) = create_test_router().await;
    let (_, raw) = create_user_with_key(&state, "ops", Role::User).await;

    let (status, created): (StatusCode, Value) = send_request(
        app.clone(),
        authed_request(
            Method::POST,
            "/api/v1/assets",
            &raw,
            Some(json!({"asset_type": "hardware", "name": "laptop-7", "hardware_type": "PC"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["hardware_type"], "PC");

    // users are admin only
    let (status, _): (StatusCode, Value) =
        send_request(app, authed_request(Method::GET, "/api/v1/users", &raw, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_disabled_account_is_rejected() {
    let (app, state) = create_test_router().await;
    let (user, raw) = create_user_with_key(&state, "leaver", Role::User).await;

    create_user_repository(&state.db)
        .update(
            user.id,
            &UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (status, body): (StatusCode, Value) =
        send_request(app, authed_request(Method::GET, "/api/v1/tags", &raw, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "ACCOUNT_DISABLED");
}
