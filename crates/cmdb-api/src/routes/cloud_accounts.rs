//! Cloud account and access key endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use cmdb_core::{AccessKey, AccessKeyInput, CloudAccount, CloudAccountInput};

use crate::auth::AuthenticatedUser;
use crate::dto::ItemsResponse;
use crate::error::{ApiError, ErrorResponse};
use crate::state::AppState;

/// Creates cloud account routes, nested under `/cloud-accounts`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_accounts).post(create_account))
        .route(
            "/:id",
            get(get_account).put(update_account).delete(delete_account),
        )
        .route("/:id/access-keys", post(add_access_key))
        .route(
            "/:id/access-keys/:key_id",
            put(update_access_key).delete(delete_access_key),
        )
}

#[derive(Debug, Deserialize)]
pub struct ListAccountsQuery {
    pub cloud_provider: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/cloud-accounts",
    params(
        ("cloud_provider" = Option<String>, Query, description = "Exact provider name")
    ),
    responses(
        (status = 200, description = "Accounts with access keys; secrets masked for non-admins", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse)
    ),
    tag = "Cloud Accounts"
)]
async fn list_accounts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListAccountsQuery>,
) -> Result<Json<ItemsResponse<CloudAccount>>, ApiError> {
    let provider = query
        .cloud_provider
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    let accounts = state.cloud_accounts.list(&user.context(), provider).await?;
    Ok(Json(accounts.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/cloud-accounts",
    request_body(content = serde_json::Value, description = "Account with optional nested access keys"),
    responses(
        (status = 201, description = "Account created", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 409, description = "Provider and account name already registered", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Cloud Accounts"
)]
async fn create_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CloudAccountInput>,
) -> Result<(StatusCode, Json<CloudAccount>), ApiError> {
    let account = state.cloud_accounts.create(&user.context(), &input).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

#[utoipa::path(
    get,
    path = "/api/v1/cloud-accounts/{id}",
    params(
        ("id" = i64, Path, description = "Cloud account ID")
    ),
    responses(
        (status = 200, description = "Account with access keys", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 404, description = "Cloud account not found", body = ErrorResponse)
    ),
    tag = "Cloud Accounts"
)]
async fn get_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<CloudAccount>, ApiError> {
    Ok(Json(state.cloud_accounts.get(&user.context(), id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/cloud-accounts/{id}",
    params(
        ("id" = i64, Path, description = "Cloud account ID")
    ),
    request_body(content = serde_json::Value, description = "Account; blank or masked secrets keep their stored value"),
    responses(
        (status = 200, description = "Account updated", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 404, description = "Cloud account not found", body = ErrorResponse),
        (status = 409, description = "Provider and account name already registered", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Cloud Accounts"
)]
async fn update_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<CloudAccountInput>,
) -> Result<Json<CloudAccount>, ApiError> {
    Ok(Json(
        state
            .cloud_accounts
            .update(&user.context(), id, &input)
            .await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cloud-accounts/{id}",
    params(
        ("id" = i64, Path, description = "Cloud account ID")
    ),
    responses(
        (status = 204, description = "Account and its access keys deleted"),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 404, description = "Cloud account not found", body = ErrorResponse)
    ),
    tag = "Cloud Accounts"
)]
async fn delete_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.cloud_accounts.delete(&user.context(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/cloud-accounts/{id}/access-keys",
    params(
        ("id" = i64, Path, description = "Cloud account ID")
    ),
    request_body(content = serde_json::Value, description = "`access_key` and `secret_key`"),
    responses(
        (status = 201, description = "Access key added", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 404, description = "Cloud account not found", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Cloud Accounts"
)]
async fn add_access_key(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<AccessKeyInput>,
) -> Result<(StatusCode, Json<AccessKey>), ApiError> {
    let key = state
        .cloud_accounts
        .add_access_key(&user.context(), id, &input)
        .await?;
    Ok((StatusCode::CREATED, Json(key)))
}

/// Updates an access key. A blank or masked `secret_key` keeps the stored
/// secret.
#[utoipa::path(
    put,
    path = "/api/v1/cloud-accounts/{id}/access-keys/{key_id}",
    params(
        ("id" = i64, Path, description = "Cloud account ID"),
        ("key_id" = i64, Path, description = "Access key ID")
    ),
    request_body(content = serde_json::Value, description = "Access key; blank or masked `secret_key` keeps the stored secret"),
    responses(
        (status = 200, description = "Access key updated", body = serde_json::Value),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 404, description = "Cloud account or access key not found", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Cloud Accounts"
)]
async fn update_access_key(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((id, key_id)): Path<(i64, i64)>,
    Json(input): Json<AccessKeyInput>,
) -> Result<Json<AccessKey>, ApiError> {
    let key = state
        .cloud_accounts
        .update_access_key(&user.context(), id, key_id, &input)
        .await?;
    Ok(Json(key))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cloud-accounts/{id}/access-keys/{key_id}",
    params(
        ("id" = i64, Path, description = "Cloud account ID"),
        ("key_id" = i64, Path, description = "Access key ID")
    ),
    responses(
        (status = 204, description = "Access key deleted"),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 404, description = "Cloud account or access key not found", body = ErrorResponse)
    ),
    tag = "Cloud Accounts"
)]
async fn delete_access_key(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((id, key_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state
        .cloud_accounts
        .delete_access_key(&user.context(), id, key_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use cmdb_core::Role;
    use serde_json::{json, Value};

    use crate::test_helpers::{create_test_state, create_test_user, send, send_json, test_router};

    fn account_body(name: &str) -> Value {
        json!({
            "cloud_provider": "aliyun",
            "account_name": name,
            "password": "console-pass",
            "balance": 120.5,
            "access_keys": [
                {"access_key": "LTAI-primary", "secret_key": "primary-secret", "assigned_to": "ops"}
            ]
        })
    }

    #[tokio::test]
    async fn test_account_lifecycle() {
        let state = create_test_state().await;
        let admin = create_test_user(&state, "root", Role::Admin).await;
        let user = create_test_user(&state, "ops", Role::User).await;
        let admin_app = test_router(state.clone(), admin);
        let app = test_router(state, user);

        let (status, created): (_, Value) = send_json(
            &app,
            Method::POST,
            "/api/v1/cloud-accounts",
            Some(account_body("main")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["password"], "***");
        assert_eq!(created["access_keys"][0]["secret_key"], "***");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/cloud-accounts",
            Some(account_body("main")),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let uri = format!("/api/v1/cloud-accounts/{}", created["id"]);
        let (_, fetched): (_, Value) = send_json(&admin_app, Method::GET, &uri, None).await;
        assert_eq!(fetched["password"], "console-pass");
        assert_eq!(fetched["access_keys"][0]["secret_key"], "primary-secret");

        let (_, listed): (_, Value) = send_json(
            &app,
            Method::GET,
            "/api/v1/cloud-accounts?cloud_provider=aws",
            None,
        )
        .await;
        assert_eq!(listed["total"], 0);

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_access_key_blank_secret_keeps_ciphertext() {
        let state = create_test_state().await;
        let user = create_test_user(&state, "ops", Role::User).await;
        let app = test_router(state.clone(), user);

        let (_, account): (_, Value) = send_json(
            &app,
            Method::POST,
            "/api/v1/cloud-accounts",
            Some(json!({"cloud_provider": "aws", "account_name": "prod"})),
        )
        .await;
        let keys_uri = format!("/api/v1/cloud-accounts/{}/access-keys", account["id"]);

        let (status, key): (_, Value) = send_json(
            &app,
            Method::POST,
            &keys_uri,
            Some(json!({"access_key": "AKIA1", "secret_key": "topsecret"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let stored_secret = || async {
            sqlx::query_scalar::<_, String>("SELECT secret_key_encrypted FROM access_keys")
                .fetch_one(state.db.sqlite())
                .await
                .unwrap()
        };
        let before = stored_secret().await;

        let key_uri = format!("{}/{}", keys_uri, key["id"]);
        let (status, updated): (_, Value) = send_json(
            &app,
            Method::PUT,
            &key_uri,
            Some(json!({"access_key": "AKIA1", "secret_key": "", "description": "rotated"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["description"], "rotated");
        assert_eq!(stored_secret().await, before);

        let (status, _) = send(&app, Method::DELETE, &key_uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::DELETE, &key_uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
