//! API key repository for database operations.

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, DbError, DbPool};
use crate::auth::ApiKey;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

/// Repository trait for API key persistence.
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    /// Creates a new API key.
    async fn create(&self, api_key: &ApiKey) -> Result<ApiKey, DbError>;

    /// Gets an API key by its prefix (for lookup during authentication).
    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, DbError>;

    /// Lists API keys for a specific user, newest first.
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<ApiKey>, DbError>;

    /// Updates the last_used_at timestamp.
    async fn update_last_used(&self, id: Uuid) -> Result<(), DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;
}

/// SQLite implementation of ApiKeyRepository.
pub struct SqliteApiKeyRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteApiKeyRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

const API_KEY_COLUMNS: &str =
    "id, user_id, name, key_hash, key_prefix, expires_at, last_used_at, created_at";

#[async_trait]
impl ApiKeyRepository for SqliteApiKeyRepository {
    async fn create(&self, api_key: &ApiKey) -> Result<ApiKey, DbError> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (id, user_id, name, key_hash, key_prefix, expires_at, last_used_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(api_key.id.to_string())
        .bind(api_key.user_id)
        .bind(&api_key.name)
        .bind(&api_key.key_hash)
        .bind(&api_key.key_prefix)
        .bind(api_key.expires_at.as_ref().map(format_timestamp))
        .bind(api_key.last_used_at.as_ref().map(format_timestamp))
        .bind(format_timestamp(&api_key.created_at))
        .execute(&self.pool)
        .await?;

        Ok(api_key.clone())
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, DbError> {
        let row: Option<SqliteApiKeyRow> = sqlx::query_as(&format!(
            "SELECT {} FROM api_keys WHERE key_prefix = ?",
            API_KEY_COLUMNS
        ))
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<ApiKey>, DbError> {
        let rows: Vec<SqliteApiKeyRow> = sqlx::query_as(&format!(
            "SELECT {} FROM api_keys WHERE user_id = ? ORDER BY created_at DESC",
            API_KEY_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_last_used(&self, id: Uuid) -> Result<(), DbError> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(format_timestamp(&Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Creates the API key repository for a pool.
pub fn create_api_key_repository(pool: &DbPool) -> Box<dyn ApiKeyRepository> {
    Box::new(SqliteApiKeyRepository::new(pool.sqlite().clone()))
}

#[derive(sqlx::FromRow)]
struct SqliteApiKeyRow {
    id: String,
    user_id: i64,
    name: String,
    key_hash: String,
    key_prefix: String,
    expires_at: Option<String>,
    last_used_at: Option<String>,
    created_at: String,
}

impl TryFrom<SqliteApiKeyRow> for ApiKey {
    type Error = DbError;

    fn try_from(row: SqliteApiKeyRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| DbError::Serialization(format!("Invalid UUID: {}", e)))?;

        Ok(ApiKey {
            id,
            user_id: row.user_id,
            name: row.name,
            key_hash: row.key_hash,
            key_prefix: row.key_prefix,
            expires_at: parse_optional_timestamp(row.expires_at)?,
            last_used_at: parse_optional_timestamp(row.last_used_at)?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, User};
    use crate::db::{create_in_memory_pool, create_user_repository};

    #[tokio::test]
    async fn test_api_key_lifecycle() {
        let pool = create_in_memory_pool().await.unwrap();
        let user = create_user_repository(&pool)
            .create(&User::new("ci", None, None, Role::Admin))
            .await
            .unwrap();
        let repo = create_api_key_repository(&pool);

        let (key, raw) = ApiKey::new(user.id, "deploy");
        repo.create(&key).await.unwrap();

        let prefix = ApiKey::prefix_of(&raw).unwrap();
        let found = repo.get_by_prefix(prefix).await.unwrap().unwrap();
        assert!(found.verify(&raw));
        assert!(found.last_used_at.is_none());

        repo.update_last_used(found.id).await.unwrap();
        let keys = repo.list_by_user(user.id).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].last_used_at.is_some());

        assert!(repo.delete(found.id).await.unwrap());
        assert!(repo.get_by_prefix(prefix).await.unwrap().is_none());
    }
}
