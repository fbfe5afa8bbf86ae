//! Axum extractors for authentication and authorization.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::{debug, warn};

use cmdb_core::{
    auth::{ApiKey, Role},
    db::{create_api_key_repository, create_user_repository, DbPool},
    AuthorizationContext, User,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Extractor for authenticated users.
///
/// Looks for `Authorization: Bearer cmdb_<prefix>_<secret>`, resolves the
/// key to its owner and rejects with 401 when the header is missing or the
/// key does not verify.
///
/// # Example
///
/// ```ignore
/// async fn protected_endpoint(user: AuthenticatedUser) -> impl IntoResponse {
///     let ctx = user.context();
///     // pass ctx to a store
/// }
/// ```
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    /// Authorization context for store calls made on behalf of this user.
    pub fn context(&self) -> AuthorizationContext {
        AuthorizationContext::from_user(&self.0)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // In tests, check for injected test user first
        #[cfg(test)]
        {
            if let Some(test_user) = parts.extensions.get::<super::test_helpers::TestUser>() {
                return Ok(AuthenticatedUser(test_user.0.clone()));
            }
        }

        let app_state = AppState::from_ref(state);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

        let validated = validate_api_key(&app_state.db, token)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid API key".to_string()))?;

        if !validated.user.is_active {
            return Err(ApiError::AccountDisabled);
        }
        parts.extensions.insert(validated.api_key);
        Ok(AuthenticatedUser(validated.user))
    }
}

/// Extractor that requires admin role.
///
/// Returns 403 Forbidden if the user is not an admin.
pub struct RequireAdmin(pub User);

impl RequireAdmin {
    pub fn context(&self) -> AuthorizationContext {
        AuthorizationContext::from_user(&self.0)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(user) = AuthenticatedUser::from_request_parts(parts, state).await?;

        if user.role != Role::Admin {
            warn!(user_id = user.id, username = %user.username, "Admin access denied");
            return Err(ApiError::Forbidden("Admin access required".to_string()));
        }

        Ok(RequireAdmin(user))
    }
}

/// Result of API key validation, including the key and user.
pub struct ValidatedApiKey {
    /// The validated API key.
    pub api_key: ApiKey,
    /// The user who owns this key.
    pub user: User,
}

/// Validates an API key and returns the associated user.
///
/// # Validation Steps
///
/// 1. Parse the lookup prefix out of the raw key
/// 2. Look up key by prefix in database
/// 3. Verify full key hash matches
/// 4. Check expiration
/// 5. Load the owning user
/// 6. Update last_used_at timestamp
pub async fn validate_api_key(
    db: &DbPool,
    token: &str,
) -> Result<Option<ValidatedApiKey>, ApiError> {
    let Some(key_prefix) = ApiKey::prefix_of(token) else {
        debug!("API key rejected: expected cmdb_<prefix>_<secret>");
        return Ok(None);
    };

    let api_key_repo = create_api_key_repository(db);
    let api_key = match api_key_repo.get_by_prefix(key_prefix).await {
        Ok(Some(key)) => key,
        Ok(None) => {
            debug!(prefix = %key_prefix, "API key not found");
            return Ok(None);
        }
        Err(e) => {
            warn!(error = %e, "Database error looking up API key");
            return Err(ApiError::Internal("Database error".to_string()));
        }
    };

    if !api_key.verify(token) {
        warn!(prefix = %key_prefix, "API key hash verification failed");
        return Ok(None);
    }

    if api_key.is_expired() {
        debug!(
            prefix = %key_prefix,
            expires_at = ?api_key.expires_at,
            "API key has expired"
        );
        return Err(ApiError::Unauthorized("API key has expired".to_string()));
    }

    let user_repo = create_user_repository(db);
    let user = match user_repo.get(api_key.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(user_id = api_key.user_id, prefix = %key_prefix, "API key owner not found");
            return Err(ApiError::Unauthorized(
                "API key owner not found".to_string(),
            ));
        }
        Err(e) => {
            warn!(error = %e, "Database error loading API key owner");
            return Err(ApiError::Internal("Database error".to_string()));
        }
    };

    // Fire-and-forget; a failed timestamp update must not fail the request.
    let api_key_id = api_key.id;
    let db_clone = db.clone();
    tokio::spawn(async move {
        let repo = create_api_key_repository(&db_clone);
        if let Err(e) = repo.update_last_used(api_key_id).await {
            warn!(error = %e, "Failed to update API key last_used_at");
        }
    });

    debug!(
        prefix = %key_prefix,
        user_id = user.id,
        username = %user.username,
        "API key validated successfully"
    );

    Ok(Some(ValidatedApiKey { api_key, user }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{create_test_state, create_test_user};

    #[tokio::test]
    async fn test_validate_api_key() {
        let state = create_test_state().await;
        let user = create_test_user(&state, "alice", Role::User).await;

        let (key, raw) = ApiKey::new(user.id, "ci");
        create_api_key_repository(&state.db)
            .create(&key)
            .await
            .unwrap();

        let validated = validate_api_key(&state.db, &raw).await.unwrap().unwrap();
        assert_eq!(validated.user.id, user.id);

        let tampered = format!("{}x", raw);
        assert!(validate_api_key(&state.db, &tampered).await.unwrap().is_none());
        assert!(validate_api_key(&state.db, "other_abc_def").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_key_is_unauthorized() {
        let state = create_test_state().await;
        let user = create_test_user(&state, "bob", Role::User).await;

        let (mut key, raw) = ApiKey::new(user.id, "old");
        key.expires_at = Some(chrono::Utc::now() - chrono::Duration::days(1));
        create_api_key_repository(&state.db)
            .create(&key)
            .await
            .unwrap();

        assert!(matches!(
            validate_api_key(&state.db, &raw).await,
            Err(ApiError::Unauthorized(_))
        ));
    }
}
