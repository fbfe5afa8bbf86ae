//! Asset credential endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};

use cmdb_core::{Credential, CredentialInput};

use crate::auth::{AuthenticatedUser, RequireAdmin};
use crate::dto::ItemsResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// Creates credential routes, nested under `/credentials`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/assets/:asset_id/credentials",
            get(list_credentials).post(create_credential),
        )
        .route("/:id/decrypt", get(decrypt_credential))
        .route("/:id", delete(delete_credential))
}

/// Credentials of an asset. Values are masked unless the caller is an admin.
async fn list_credentials(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(asset_id): Path<i64>,
) -> Result<Json<ItemsResponse<Credential>>, ApiError> {
    let credentials = state
        .credentials
        .list_for_asset(&user.context(), asset_id)
        .await?;
    Ok(Json(credentials.into()))
}

async fn create_credential(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(asset_id): Path<i64>,
    Json(input): Json<CredentialInput>,
) -> Result<(StatusCode, Json<Credential>), ApiError> {
    let credential = state
        .credentials
        .create(&user.context(), asset_id, &input)
        .await?;
    Ok((StatusCode::CREATED, Json(credential)))
}

/// Returns a credential with its plaintext value.
async fn decrypt_credential(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(id): Path<i64>,
) -> Result<Json<Credential>, ApiError> {
    Ok(Json(state.credentials.reveal(&admin.context(), id).await?))
}

async fn delete_credential(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.credentials.delete(&admin.context(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use cmdb_core::Role;
    use serde_json::{json, Value};

    use crate::state::AppState;
    use crate::test_helpers::{create_test_state, create_test_user, send, send_json, test_router};

    async fn create_asset(app: &axum::Router) -> i64 {
        let (status, asset): (_, Value) = send_json(
            app,
            Method::POST,
            "/api/v1/assets",
            Some(json!({"asset_type": "server", "name": "bastion"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        asset["id"].as_i64().unwrap()
    }

    async fn routers() -> (AppState, axum::Router, axum::Router) {
        let state = create_test_state().await;
        let admin = create_test_user(&state, "root", Role::Admin).await;
        let user = create_test_user(&state, "viewer", Role::User).await;
        (
            state.clone(),
            test_router(state.clone(), admin),
            test_router(state, user),
        )
    }

    #[tokio::test]
    async fn test_user_sees_mask_and_admin_decrypts() {
        let (_, admin, user) = routers().await;
        let asset_id = create_asset(&user).await;
        let uri = format!("/api/v1/credentials/assets/{}/credentials", asset_id);

        let (status, created): (_, Value) = send_json(
            &user,
            Method::POST,
            &uri,
            Some(json!({"credential_type": "ssh_key", "key": "deploy", "value": "-----BEGIN KEY-----"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["value"], "***");

        let (_, listed): (_, Value) = send_json(&user, Method::GET, &uri, None).await;
        assert_eq!(listed["total"], 1);
        assert_eq!(listed["items"][0]["value"], "***");

        let (_, listed): (_, Value) = send_json(&admin, Method::GET, &uri, None).await;
        assert_eq!(listed["items"][0]["value"], "-----BEGIN KEY-----");

        let decrypt = format!("/api/v1/credentials/{}/decrypt", created["id"]);
        let (status, _) = send(&user, Method::GET, &decrypt, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, revealed): (_, Value) = send_json(&admin, Method::GET, &decrypt, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(revealed["value"], "-----BEGIN KEY-----");
    }

    #[tokio::test]
    async fn test_value_is_encrypted_at_rest() {
        let (state, _, user) = routers().await;
        let asset_id = create_asset(&user).await;
        let uri = format!("/api/v1/credentials/assets/{}/credentials", asset_id);
        send(
            &user,
            Method::POST,
            &uri,
            Some(json!({"credential_type": "password", "key": "root", "value": "s3cret"})),
        )
        .await;

        let stored: String = sqlx::query_scalar("SELECT value_encrypted FROM credentials LIMIT 1")
            .fetch_one(state.db.sqlite())
            .await
            .unwrap();
        assert_ne!(stored, "s3cret");
        assert_eq!(state.cipher.decrypt(&stored).unwrap(), "s3cret");
    }

    #[tokio::test]
    async fn test_delete_is_admin_only() {
        let (_, admin, user) = routers().await;
        let asset_id = create_asset(&user).await;
        let (_, created): (_, Value) = send_json(
            &user,
            Method::POST,
            &format!("/api/v1/credentials/assets/{}/credentials", asset_id),
            Some(json!({"credential_type": "password", "key": "root", "value": "x"})),
        )
        .await;
        let uri = format!("/api/v1/credentials/{}", created["id"]);

        let (status, _) = send(&user, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&admin, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&admin, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_asset() {
        let (_, _, user) = routers().await;
        let (status, _) = send(
            &user,
            Method::POST,
            "/api/v1/credentials/assets/999/credentials",
            Some(json!({"credential_type": "password", "key": "root", "value": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
