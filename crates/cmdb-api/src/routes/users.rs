//! User management routes (admin only).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use cmdb_core::{
    auth::{Role, UserUpdate},
    db::create_user_repository,
    hash_password, validate_password_strength, User,
};

use crate::auth::RequireAdmin;
use crate::dto::ItemsResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// Creates the user management routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/:id/password", put(reset_password))
}

/// Request to create a new user.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    /// Omitted for accounts that only use API keys.
    pub password: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    Role::User.as_str().to_string()
}

/// Request to update a user. An empty `email` clears it.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

fn parse_role(raw: &str) -> Result<Role, ApiError> {
    raw.parse::<Role>().map_err(|_| {
        ApiError::validation_field(
            "role",
            "invalid_role",
            &format!("Invalid role: '{}'. Valid roles are: admin, user", raw),
        )
    })
}

fn hash_checked(password: &str) -> Result<String, ApiError> {
    let problems = validate_password_strength(password);
    if !problems.is_empty() {
        return Err(ApiError::validation_field(
            "password",
            "weak_password",
            &problems.join("; "),
        ));
    }
    hash_password(password).map_err(|e| ApiError::Internal(format!("Failed to hash password: {}", e)))
}

async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<ItemsResponse<User>>, ApiError> {
    let users = create_user_repository(&state.db).list().await?;
    Ok(Json(users.into()))
}

async fn create_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    request.validate()?;
    let role = parse_role(&request.role)?;
    let password_hash = request.password.as_deref().map(hash_checked).transpose()?;

    let user_repo = create_user_repository(&state.db);
    let username = request.username.trim();
    if user_repo.get_by_username(username).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "Username '{}' is already taken",
            username
        )));
    }

    let email = request.email.filter(|e| !e.trim().is_empty());
    let created = user_repo
        .create(&User::new(username, email, password_hash, role))
        .await?;

    info!(
        user_id = created.id,
        username = %created.username,
        role = %created.role.as_str(),
        actor = %admin.username,
        "User created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_user(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    let user = create_user_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))?;
    Ok(Json(user))
}

async fn update_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let role = request.role.as_deref().map(parse_role).transpose()?;

    if admin.id == id {
        if request.is_active == Some(false) {
            return Err(ApiError::BadRequest(
                "Cannot disable your own account".to_string(),
            ));
        }
        if matches!(role, Some(r) if r != Role::Admin) {
            return Err(ApiError::BadRequest(
                "Cannot demote your own account".to_string(),
            ));
        }
    }

    let user_repo = create_user_repository(&state.db);
    if user_repo.get(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("User {} not found", id)));
    }

    let update = UserUpdate {
        email: request
            .email
            .map(|e| Some(e.trim().to_string()).filter(|e| !e.is_empty())),
        role,
        is_active: request.is_active,
    };
    let updated = user_repo.update(id, &update).await?;

    info!(user_id = id, actor = %admin.username, "User updated");
    Ok(Json(updated))
}

async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if admin.id == id {
        return Err(ApiError::BadRequest(
            "Cannot delete your own account".to_string(),
        ));
    }

    if !create_user_repository(&state.db).delete(id).await? {
        return Err(ApiError::NotFound(format!("User {} not found", id)));
    }

    info!(user_id = id, actor = %admin.username, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Sets a user's password, e.g. for accounts brought in by an import.
async fn reset_password(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i64>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let password_hash = hash_checked(&request.password)?;

    let user_repo = create_user_repository(&state.db);
    if user_repo.get(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("User {} not found", id)));
    }
    user_repo.update_password(id, &password_hash).await?;

    info!(user_id = id, actor = %admin.username, "Password reset");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde_json::{json, Value};

    use crate::test_helpers::{create_test_state, create_test_user, send, send_json, test_router};

    async fn admin_app() -> (AppState, User, Router) {
        let state = create_test_state().await;
        let admin = create_test_user(&state, "root", Role::Admin).await;
        let app = test_router(state.clone(), admin.clone());
        (state, admin, app)
    }

    #[tokio::test]
    async fn test_create_list_and_duplicate() {
        let (_, _, app) = admin_app().await;

        let (status, created): (_, Value) = send_json(
            &app,
            Method::POST,
            "/api/v1/users",
            Some(json!({"username": "alice", "email": "alice@example.com", "password": "Str0ng-Passw0rd"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["role"], "user");
        assert!(created.get("password_hash").is_none());

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/users",
            Some(json!({"username": "alice"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, users): (_, Value) = send_json(&app, Method::GET, "/api/v1/users", None).await;
        assert_eq!(users["total"], 2);
    }

    #[tokio::test]
    async fn test_weak_password_and_bad_role() {
        let (_, _, app) = admin_app().await;

        let (status, error): (_, Value) = send_json(
            &app,
            Method::POST,
            "/api/v1/users",
            Some(json!({"username": "bob", "password": "short"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(error["details"]["fields"]["password"].is_array());

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/users",
            Some(json!({"username": "bob", "role": "superuser"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_admin_cannot_remove_themselves() {
        let (_, admin, app) = admin_app().await;
        let uri = format!("/api/v1/users/{}", admin.id);

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::PUT, &uri, Some(json!({"role": "user"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::PUT, &uri, Some(json!({"is_active": false}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_reset_and_delete() {
        let (state, _, app) = admin_app().await;
        let target = create_test_user(&state, "carol", Role::User).await;
        let uri = format!("/api/v1/users/{}", target.id);

        let (status, updated): (_, Value) = send_json(
            &app,
            Method::PUT,
            &uri,
            Some(json!({"role": "admin", "email": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["role"], "admin");
        assert!(updated["email"].is_null());

        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("{}/password", uri),
            Some(json!({"password": "An0ther-Secret"})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_non_admin_is_forbidden() {
        let state = create_test_state().await;
        let user = create_test_user(&state, "dave", Role::User).await;
        let app = test_router(state, user);

        let (status, error): (_, Value) =
            send_json(&app, Method::GET, "/api/v1/users", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error["code"], "FORBIDDEN");
    }
}
