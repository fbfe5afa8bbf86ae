//! User repository for database operations.

use super::{format_timestamp, parse_timestamp, DbError, DbPool};
use crate::auth::{Role, User, UserUpdate};
use async_trait::async_trait;
use chrono::Utc;

/// Repository trait for user persistence.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts a user and returns it with its assigned id.
    async fn create(&self, user: &User) -> Result<User, DbError>;

    async fn get(&self, id: i64) -> Result<Option<User>, DbError>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, DbError>;

    /// Lists all users ordered by id.
    async fn list(&self) -> Result<Vec<User>, DbError>;

    async fn update(&self, id: i64, update: &UserUpdate) -> Result<User, DbError>;

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), DbError>;

    async fn delete(&self, id: i64) -> Result<bool, DbError>;

    /// Checks if any users exist (for initial setup).
    async fn any_exist(&self) -> Result<bool, DbError>;
}

/// SQLite implementation of UserRepository.
pub struct SqliteUserRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, is_active, created_at, updated_at";

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: &User) -> Result<User, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, role, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(format_timestamp(&user.created_at))
        .bind(format_timestamp(&user.updated_at))
        .execute(&self.pool)
        .await?;

        let mut created = user.clone();
        created.id = result.last_insert_rowid();
        Ok(created)
    }

    async fn get(&self, id: i64) -> Result<Option<User>, DbError> {
        let row: Option<SqliteUserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let row: Option<SqliteUserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self) -> Result<Vec<User>, DbError> {
        let rows: Vec<SqliteUserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users ORDER BY id ASC", USER_COLUMNS))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update(&self, id: i64, update: &UserUpdate) -> Result<User, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))?;

        let email = match &update.email {
            Some(email) => email.clone(),
            None => existing.email.clone(),
        };
        let role = update.role.unwrap_or(existing.role);
        let is_active = update.is_active.unwrap_or(existing.is_active);

        sqlx::query(
            "UPDATE users SET email = ?, role = ?, is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&email)
        .bind(role.as_str())
        .bind(is_active)
        .bind(format_timestamp(&Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(format_timestamp(&Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn any_exist(&self) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

/// Creates the user repository for a pool.
pub fn create_user_repository(pool: &DbPool) -> Box<dyn UserRepository> {
    Box::new(SqliteUserRepository::new(pool.sqlite().clone()))
}

#[derive(sqlx::FromRow)]
struct SqliteUserRow {
    id: i64,
    username: String,
    email: Option<String>,
    password_hash: Option<String>,
    role: String,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SqliteUserRow> for User {
    type Error = DbError;

    fn try_from(row: SqliteUserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|_| DbError::Serialization(format!("Invalid role: {}", row.role)))?;

        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role,
            is_active: row.is_active,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_in_memory_pool;

    #[tokio::test]
    async fn test_create_and_lookup() {
        let pool = create_in_memory_pool().await.unwrap();
        let repo = create_user_repository(&pool);

        assert!(!repo.any_exist().await.unwrap());

        let user = repo
            .create(&User::new("alice", Some("alice@example.com".into()), None, Role::User))
            .await
            .unwrap();
        assert!(user.id > 0);
        assert!(repo.any_exist().await.unwrap());

        let fetched = repo.get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
        assert_eq!(fetched.role, Role::User);
        assert!(fetched.password_hash.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_is_constraint() {
        let pool = create_in_memory_pool().await.unwrap();
        let repo = create_user_repository(&pool);

        repo.create(&User::new("bob", None, None, Role::User))
            .await
            .unwrap();
        let err = repo
            .create(&User::new("bob", None, None, Role::Admin))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let pool = create_in_memory_pool().await.unwrap();
        let repo = create_user_repository(&pool);
        let user = repo
            .create(&User::new("carol", None, None, Role::User))
            .await
            .unwrap();

        let updated = repo
            .update(
                user.id,
                &UserUpdate {
                    role: Some(Role::Admin),
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_admin());
        assert!(!updated.is_active);

        repo.update_password(user.id, "hash").await.unwrap();
        assert!(matches!(
            repo.update_password(999, "hash").await,
            Err(DbError::NotFound { .. })
        ));

        assert!(repo.delete(user.id).await.unwrap());
        assert!(!repo.delete(user.id).await.unwrap());
        assert!(repo.list().await.unwrap().is_empty());
    }
}
