//! Cloud account repository for database operations.

use super::tag_repo::placeholders;
use super::{format_timestamp, parse_timestamp, DbError, DbPool};
use crate::models::{AccessKey, CloudAccount};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqliteConnection;
use std::collections::HashMap;

/// A cloud account as written to the database, secrets already encrypted.
#[derive(Debug, Clone, Default)]
pub struct CloudAccountRecord {
    pub cloud_provider: String,
    pub account_name: String,
    pub password_encrypted: Option<String>,
    pub phone: Option<String>,
    pub balance: Option<f64>,
    pub notes: Option<String>,
    /// `None` on update leaves the keys untouched.
    pub access_keys: Option<Vec<AccessKeyRecord>>,
}

/// An access key as written to the database, secret already encrypted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessKeyRecord {
    pub access_key: String,
    pub secret_key_encrypted: String,
    pub assigned_to: Option<String>,
    pub description: Option<String>,
}

/// Repository trait for cloud accounts and their access keys.
#[async_trait]
pub trait CloudAccountRepository: Send + Sync {
    async fn create(&self, record: &CloudAccountRecord) -> Result<CloudAccount, DbError>;

    async fn get(&self, id: i64) -> Result<Option<CloudAccount>, DbError>;

    async fn exists(&self, id: i64) -> Result<bool, DbError>;

    /// Looks an account up by `(cloud_provider, account_name)`.
    async fn find_by_natural_key(
        &self,
        cloud_provider: &str,
        account_name: &str,
    ) -> Result<Option<CloudAccount>, DbError>;

    /// Lists accounts newest first, optionally for one provider.
    async fn list(&self, cloud_provider: Option<&str>) -> Result<Vec<CloudAccount>, DbError>;

    async fn update(&self, id: i64, record: &CloudAccountRecord)
        -> Result<CloudAccount, DbError>;

    /// Deletes the account and its keys, and clears the reference from
    /// every cloud asset that pointed at it.
    async fn delete(&self, id: i64) -> Result<bool, DbError>;

    async fn add_access_key(
        &self,
        account_id: i64,
        record: &AccessKeyRecord,
    ) -> Result<AccessKey, DbError>;

    /// Gets a key only if it belongs to `account_id`.
    async fn get_access_key(
        &self,
        account_id: i64,
        key_id: i64,
    ) -> Result<Option<AccessKey>, DbError>;

    async fn update_access_key(
        &self,
        account_id: i64,
        key_id: i64,
        record: &AccessKeyRecord,
    ) -> Result<AccessKey, DbError>;

    async fn delete_access_key(&self, account_id: i64, key_id: i64) -> Result<bool, DbError>;
}

/// SQLite implementation of CloudAccountRepository.
pub struct SqliteCloudAccountRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteCloudAccountRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

const ACCOUNT_COLUMNS: &str = "id, cloud_provider, account_name, password_encrypted, phone, balance, notes, created_at, updated_at";

const ACCESS_KEY_COLUMNS: &str =
    "id, cloud_account_id, access_key, secret_key_encrypted, assigned_to, description, created_at";

#[async_trait]
impl CloudAccountRepository for SqliteCloudAccountRepository {
    async fn create(&self, record: &CloudAccountRecord) -> Result<CloudAccount, DbError> {
        let now = format_timestamp(&Utc::now());
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO cloud_accounts (cloud_provider, account_name, password_encrypted, phone, balance, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.cloud_provider)
        .bind(&record.account_name)
        .bind(&record.password_encrypted)
        .bind(&record.phone)
        .bind(record.balance)
        .bind(&record.notes)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        if let Some(keys) = &record.access_keys {
            replace_access_keys(&mut *tx, id, keys).await?;
        }

        let account = load_account(&mut *tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("CloudAccount", id))?;
        tx.commit().await?;

        Ok(account)
    }

    async fn get(&self, id: i64) -> Result<Option<CloudAccount>, DbError> {
        let mut conn = self.pool.acquire().await?;
        load_account(&mut *conn, id).await
    }

    async fn exists(&self, id: i64) -> Result<bool, DbError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM cloud_accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn find_by_natural_key(
        &self,
        cloud_provider: &str,
        account_name: &str,
    ) -> Result<Option<CloudAccount>, DbError> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM cloud_accounts WHERE cloud_provider = ? AND account_name = ?",
        )
        .bind(cloud_provider)
        .bind(account_name)
        .fetch_optional(&self.pool)
        .await?;

        match id {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }

    async fn list(&self, cloud_provider: Option<&str>) -> Result<Vec<CloudAccount>, DbError> {
        let mut query = format!("SELECT {} FROM cloud_accounts WHERE 1=1", ACCOUNT_COLUMNS);
        if cloud_provider.is_some() {
            query.push_str(" AND cloud_provider = ?");
        }
        query.push_str(" ORDER BY created_at DESC, id DESC");

        let mut sqlx_query = sqlx::query_as::<_, SqliteCloudAccountRow>(&query);
        if let Some(provider) = cloud_provider {
            sqlx_query = sqlx_query.bind(provider);
        }
        let rows = sqlx_query.fetch_all(&self.pool).await?;

        let mut accounts: Vec<CloudAccount> = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<_, _>>()?;
        let ids: Vec<i64> = accounts.iter().map(|a| a.id).collect();

        let mut conn = self.pool.acquire().await?;
        let mut keys: HashMap<i64, Vec<AccessKey>> = HashMap::new();
        for chunk in ids.chunks(500) {
            keys.extend(load_keys_for_accounts(&mut *conn, chunk).await?);
        }
        for account in &mut accounts {
            account.access_keys = keys.remove(&account.id).unwrap_or_default();
        }

        Ok(accounts)
    }

    async fn update(
        &self,
        id: i64,
        record: &CloudAccountRecord,
    ) -> Result<CloudAccount, DbError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE cloud_accounts
            SET cloud_provider = ?, account_name = ?, password_encrypted = ?, phone = ?, balance = ?, notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.cloud_provider)
        .bind(&record.account_name)
        .bind(&record.password_encrypted)
        .bind(&record.phone)
        .bind(record.balance)
        .bind(&record.notes)
        .bind(format_timestamp(&Utc::now()))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CloudAccount", id));
        }

        if let Some(keys) = &record.access_keys {
            replace_access_keys(&mut *tx, id, keys).await?;
        }

        let account = load_account(&mut *tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("CloudAccount", id))?;
        tx.commit().await?;

        Ok(account)
    }

    async fn delete(&self, id: i64) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE assets
            SET details = json_set(details, '$.cloud_account_id', NULL)
            WHERE asset_type = 'cloud' AND json_extract(details, '$.cloud_account_id') = ?
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM cloud_accounts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_access_key(
        &self,
        account_id: i64,
        record: &AccessKeyRecord,
    ) -> Result<AccessKey, DbError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM cloud_accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(DbError::not_found("CloudAccount", account_id));
        }

        let position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM access_keys WHERE cloud_account_id = ?",
        )
        .bind(account_id)
        .fetch_one(&mut *tx)
        .await?;

        let key = insert_access_key(&mut *tx, account_id, record, position).await?;
        tx.commit().await?;
        Ok(key)
    }

    async fn get_access_key(
        &self,
        account_id: i64,
        key_id: i64,
    ) -> Result<Option<AccessKey>, DbError> {
        let row: Option<SqliteAccessKeyRow> = sqlx::query_as(&format!(
            "SELECT {} FROM access_keys WHERE id = ? AND cloud_account_id = ?",
            ACCESS_KEY_COLUMNS
        ))
        .bind(key_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update_access_key(
        &self,
        account_id: i64,
        key_id: i64,
        record: &AccessKeyRecord,
    ) -> Result<AccessKey, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE access_keys
            SET access_key = ?, secret_key_encrypted = ?, assigned_to = ?, description = ?
            WHERE id = ? AND cloud_account_id = ?
            "#,
        )
        .bind(&record.access_key)
        .bind(&record.secret_key_encrypted)
        .bind(&record.assigned_to)
        .bind(&record.description)
        .bind(key_id)
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("AccessKey", key_id));
        }

        self.get_access_key(account_id, key_id)
            .await?
            .ok_or_else(|| DbError::not_found("AccessKey", key_id))
    }

    async fn delete_access_key(&self, account_id: i64, key_id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM access_keys WHERE id = ? AND cloud_account_id = ?")
            .bind(key_id)
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Creates the cloud account repository for a pool.
pub fn create_cloud_account_repository(pool: &DbPool) -> Box<dyn CloudAccountRepository> {
    Box::new(SqliteCloudAccountRepository::new(pool.sqlite().clone()))
}

async fn load_account(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<CloudAccount>, DbError> {
    let row: Option<SqliteCloudAccountRow> = sqlx::query_as(&format!(
        "SELECT {} FROM cloud_accounts WHERE id = ?",
        ACCOUNT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut account = CloudAccount::try_from(row)?;
    account.access_keys = load_keys_for_accounts(&mut *conn, &[id])
        .await?
        .remove(&id)
        .unwrap_or_default();
    Ok(Some(account))
}

async fn load_keys_for_accounts(
    conn: &mut SqliteConnection,
    account_ids: &[i64],
) -> Result<HashMap<i64, Vec<AccessKey>>, DbError> {
    let mut by_account: HashMap<i64, Vec<AccessKey>> = HashMap::new();
    if account_ids.is_empty() {
        return Ok(by_account);
    }

    let query = format!(
        "SELECT {} FROM access_keys WHERE cloud_account_id IN ({}) ORDER BY position ASC, id ASC",
        ACCESS_KEY_COLUMNS,
        placeholders(account_ids.len())
    );
    let mut sqlx_query = sqlx::query_as::<_, SqliteAccessKeyRow>(&query);
    for id in account_ids {
        sqlx_query = sqlx_query.bind(id);
    }

    for row in sqlx_query.fetch_all(&mut *conn).await? {
        let key = AccessKey::try_from(row)?;
        by_account.entry(key.cloud_account_id).or_default().push(key);
    }

    Ok(by_account)
}

async fn insert_access_key(
    conn: &mut SqliteConnection,
    account_id: i64,
    record: &AccessKeyRecord,
    position: i64,
) -> Result<AccessKey, DbError> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO access_keys (cloud_account_id, access_key, secret_key_encrypted, assigned_to, description, position, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(account_id)
    .bind(&record.access_key)
    .bind(&record.secret_key_encrypted)
    .bind(&record.assigned_to)
    .bind(&record.description)
    .bind(position)
    .bind(format_timestamp(&now))
    .execute(&mut *conn)
    .await?;

    Ok(AccessKey {
        id: result.last_insert_rowid(),
        cloud_account_id: account_id,
        access_key: record.access_key.clone(),
        secret_key: record.secret_key_encrypted.clone(),
        assigned_to: record.assigned_to.clone(),
        description: record.description.clone(),
        created_at: now,
    })
}

async fn replace_access_keys(
    conn: &mut SqliteConnection,
    account_id: i64,
    keys: &[AccessKeyRecord],
) -> Result<(), DbError> {
    sqlx::query("DELETE FROM access_keys WHERE cloud_account_id = ?")
        .bind(account_id)
        .execute(&mut *conn)
        .await?;

    for (position, key) in keys.iter().enumerate() {
        insert_access_key(&mut *conn, account_id, key, position as i64).await?;
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
struct SqliteCloudAccountRow {
    id: i64,
    cloud_provider: String,
    account_name: String,
    password_encrypted: Option<String>,
    phone: Option<String>,
    balance: Option<f64>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SqliteCloudAccountRow> for CloudAccount {
    type Error = DbError;

    fn try_from(row: SqliteCloudAccountRow) -> Result<Self, Self::Error> {
        Ok(CloudAccount {
            id: row.id,
            cloud_provider: row.cloud_provider,
            account_name: row.account_name,
            password: row.password_encrypted,
            phone: row.phone,
            balance: row.balance,
            notes: row.notes,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            access_keys: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct SqliteAccessKeyRow {
    id: i64,
    cloud_account_id: i64,
    access_key: String,
    secret_key_encrypted: String,
    assigned_to: Option<String>,
    description: Option<String>,
    created_at: String,
}

impl TryFrom<SqliteAccessKeyRow> for AccessKey {
    type Error = DbError;

    fn try_from(row: SqliteAccessKeyRow) -> Result<Self, Self::Error> {
        Ok(AccessKey {
            id: row.id,
            cloud_account_id: row.cloud_account_id,
            access_key: row.access_key,
            secret_key: row.secret_key_encrypted,
            assigned_to: row.assigned_to,
            description: row.description,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
