//! API routes.

pub mod assets;
pub mod cloud_accounts;
pub mod credentials;
pub mod files;
pub mod health;
pub mod metrics;
pub mod migration;
pub mod tags;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::state::AppState;
use crate::upload::MAX_BODY_BYTES;

/// Creates the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Versioned API endpoint
        .nest("/api/v1", api_routes())
        // Unversioned alias
        .nest("/api", api_routes())
        .merge(health::routes())
        .merge(metrics::routes())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Routes that require a bearer API key.
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/assets", assets::routes())
        .nest("/tags", tags::routes())
        .nest("/credentials", credentials::routes())
        .nest("/cloud-accounts", cloud_accounts::routes())
        .nest("/migration", migration::routes())
        .nest("/files", files::routes())
        .nest("/users", users::routes())
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use cmdb_core::Role;

    use crate::test_helpers::{create_test_state, create_test_user, send, test_router};

    #[tokio::test]
    async fn test_unversioned_alias() {
        let state = create_test_state().await;
        let user = create_test_user(&state, "alias", Role::User).await;
        let app = test_router(state, user);

        for uri in ["/api/v1/tags", "/api/tags"] {
            let (status, _) = send(&app, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_missing_bearer_is_unauthorized() {
        let state = create_test_state().await;
        let app = super::create_router(state);

        let (status, body) = send(&app, Method::GET, "/api/v1/tags", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
