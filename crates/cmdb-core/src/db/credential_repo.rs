//! Credential repository for database operations.
//!
//! Values are stored as given; callers pass ciphertext in and get
//! ciphertext back.

use super::{format_timestamp, parse_timestamp, DbError, DbPool};
use crate::models::{Credential, CredentialKind};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqliteConnection;

/// A credential ready for insertion, value already encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCredential {
    pub credential_type: CredentialKind,
    pub key: String,
    pub value_encrypted: String,
    pub description: Option<String>,
}

/// Repository trait for credential persistence.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Lists the credentials of an asset in insertion order.
    async fn list_for_asset(&self, asset_id: i64) -> Result<Vec<Credential>, DbError>;

    /// Lists every credential, for export.
    async fn list_all(&self) -> Result<Vec<Credential>, DbError>;

    async fn get(&self, id: i64) -> Result<Option<Credential>, DbError>;

    /// Appends a credential to an asset.
    async fn create(&self, asset_id: i64, credential: &NewCredential)
        -> Result<Credential, DbError>;

    async fn delete(&self, id: i64) -> Result<bool, DbError>;
}

/// SQLite implementation of CredentialRepository.
pub struct SqliteCredentialRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteCredentialRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

const CREDENTIAL_COLUMNS: &str =
    "id, asset_id, credential_type, key, value_encrypted, description, created_at";

#[async_trait]
impl CredentialRepository for SqliteCredentialRepository {
    async fn list_for_asset(&self, asset_id: i64) -> Result<Vec<Credential>, DbError> {
        let mut conn = self.pool.acquire().await?;
        load_credentials(&mut *conn, asset_id).await
    }

    async fn list_all(&self) -> Result<Vec<Credential>, DbError> {
        let rows: Vec<SqliteCredentialRow> = sqlx::query_as(&format!(
            "SELECT {} FROM credentials ORDER BY asset_id ASC, position ASC, id ASC",
            CREDENTIAL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get(&self, id: i64) -> Result<Option<Credential>, DbError> {
        let row: Option<SqliteCredentialRow> = sqlx::query_as(&format!(
            "SELECT {} FROM credentials WHERE id = ?",
            CREDENTIAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn create(
        &self,
        asset_id: i64,
        credential: &NewCredential,
    ) -> Result<Credential, DbError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM assets WHERE id = ?")
            .bind(asset_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(DbError::not_found("Asset", asset_id));
        }

        let position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM credentials WHERE asset_id = ?",
        )
        .bind(asset_id)
        .fetch_one(&mut *tx)
        .await?;

        let created = insert_credential(&mut *tx, asset_id, credential, position).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn delete(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Creates the credential repository for a pool.
pub fn create_credential_repository(pool: &DbPool) -> Box<dyn CredentialRepository> {
    Box::new(SqliteCredentialRepository::new(pool.sqlite().clone()))
}

pub(crate) async fn load_credentials(
    conn: &mut SqliteConnection,
    asset_id: i64,
) -> Result<Vec<Credential>, DbError> {
    let rows: Vec<SqliteCredentialRow> = sqlx::query_as(&format!(
        "SELECT {} FROM credentials WHERE asset_id = ? ORDER BY position ASC, id ASC",
        CREDENTIAL_COLUMNS
    ))
    .bind(asset_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

pub(crate) async fn insert_credential(
    conn: &mut SqliteConnection,
    asset_id: i64,
    credential: &NewCredential,
    position: i64,
) -> Result<Credential, DbError> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO credentials (asset_id, credential_type, key, value_encrypted, description, position, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(asset_id)
    .bind(credential.credential_type.as_str())
    .bind(&credential.key)
    .bind(&credential.value_encrypted)
    .bind(&credential.description)
    .bind(position)
    .bind(format_timestamp(&now))
    .execute(&mut *conn)
    .await?;

    Ok(Credential {
        id: result.last_insert_rowid(),
        asset_id,
        credential_type: credential.credential_type,
        key: credential.key.clone(),
        value: credential.value_encrypted.clone(),
        description: credential.description.clone(),
        created_at: now,
    })
}

/// Replaces the credential set of an asset, preserving list order.
pub(crate) async fn replace_credentials(
    conn: &mut SqliteConnection,
    asset_id: i64,
    credentials: &[NewCredential],
) -> Result<Vec<Credential>, DbError> {
    sqlx::query("DELETE FROM credentials WHERE asset_id = ?")
        .bind(asset_id)
        .execute(&mut *conn)
        .await?;

    let mut created = Vec::with_capacity(credentials.len());
    for (position, credential) in credentials.iter().enumerate() {
        created.push(insert_credential(&mut *conn, asset_id, credential, position as i64).await?);
    }
    Ok(created)
}

#[derive(sqlx::FromRow)]
struct SqliteCredentialRow {
    id: i64,
    asset_id: i64,
    credential_type: String,
    key: String,
    value_encrypted: String,
    description: Option<String>,
    created_at: String,
}

impl TryFrom<SqliteCredentialRow> for Credential {
    type Error = DbError;

    fn try_from(row: SqliteCredentialRow) -> Result<Self, Self::Error> {
        let credential_type = row.credential_type.parse::<CredentialKind>().map_err(|_| {
            DbError::Serialization(format!("Invalid credential type: {}", row.credential_type))
        })?;

        Ok(Credential {
            id: row.id,
            asset_id: row.asset_id,
            credential_type,
            key: row.key,
            value: row.value_encrypted,
            description: row.description,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
