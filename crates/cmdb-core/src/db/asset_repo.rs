//! Asset repository for database operations.
//!
//! The type-specific attributes live in one JSON `details` column.
//! `expires_at` and a lowercased `search_text` are projected from them on
//! every write so that expiry windows and free-text search stay in SQL.

use super::credential_repo::{load_credentials, replace_credentials, NewCredential};
use super::tag_repo::{load_asset_tags, load_tags_for_assets, replace_asset_tags};
use super::{
    format_timestamp, make_like_pattern, parse_timestamp, DbError, DbPool, PaginatedResult,
    Pagination,
};
use crate::models::{Asset, AssetDetails, AssetFilter, AssetType, TagFilter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::collections::HashMap;

/// An asset as written to the database, secrets already encrypted.
///
/// On update, `tag_ids: None` and `credentials: None` leave the existing
/// associations untouched.
#[derive(Debug, Clone)]
pub struct AssetRecord {
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<i64>,
    pub details: AssetDetails,
    pub tag_ids: Option<Vec<i64>>,
    pub credentials: Option<Vec<NewCredential>>,
}

impl AssetRecord {
    fn search_text(&self) -> String {
        let mut parts = vec![self.name.as_str()];
        if let Some(description) = &self.description {
            parts.push(description);
        }
        parts.extend(self.details.search_terms());
        parts.join("\n").to_lowercase()
    }
}

/// Repository trait for asset persistence.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    /// Inserts the asset, its tag links and credentials in one transaction.
    async fn create(&self, record: &AssetRecord) -> Result<Asset, DbError>;

    /// Gets an asset with tags and credentials attached.
    async fn get(&self, id: i64) -> Result<Option<Asset>, DbError>;

    async fn exists(&self, id: i64) -> Result<bool, DbError>;

    /// Rewrites the asset in one transaction. `created_by` is not changed.
    async fn update(&self, id: i64, record: &AssetRecord) -> Result<Asset, DbError>;

    async fn delete(&self, id: i64) -> Result<bool, DbError>;

    /// Lists one page of matching assets, newest first, tags attached.
    async fn list(
        &self,
        filter: &AssetFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Asset>, DbError>;

    /// Lists every matching asset, newest first, tags attached.
    async fn search(&self, filter: &AssetFilter) -> Result<Vec<Asset>, DbError>;

    /// Lists every asset of every type in id order, tags attached.
    async fn list_all(&self) -> Result<Vec<Asset>, DbError>;

    /// Distinct non-blank string values of a top-level attribute, sorted.
    async fn distinct_values(
        &self,
        asset_type: AssetType,
        field: &str,
    ) -> Result<Vec<String>, DbError>;

    /// Assets of a type with `from <= expires_at <= to`, soonest first.
    async fn expiring(
        &self,
        asset_type: AssetType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Asset>, DbError>;
}

/// SQLite implementation of AssetRepository.
pub struct SqliteAssetRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteAssetRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    async fn attach_tags(&self, rows: Vec<SqliteAssetRow>) -> Result<Vec<Asset>, DbError> {
        let mut assets: Vec<Asset> = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<_, _>>()?;

        let ids: Vec<i64> = assets.iter().map(|a| a.id).collect();
        let mut conn = self.pool.acquire().await?;
        let mut by_asset = HashMap::new();
        // SQLite caps bound parameters per statement.
        for chunk in ids.chunks(500) {
            by_asset.extend(load_tags_for_assets(&mut *conn, chunk).await?);
        }
        for asset in &mut assets {
            if let Some(tags) = by_asset.remove(&asset.id) {
                asset.tags = tags;
            }
        }

        Ok(assets)
    }
}

const ASSET_COLUMNS: &str = "id, asset_type, name, description, details, created_by, created_at, updated_at";

/// Builds the WHERE clause and its parameters for a filter.
fn filter_clause(filter: &AssetFilter) -> (String, Vec<String>) {
    let mut clause = String::from(" WHERE asset_type = ?");
    let mut params = vec![filter.asset_type.as_str().to_string()];

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clause.push_str(r" AND search_text LIKE ? ESCAPE '\'");
        params.push(make_like_pattern(search));
    }

    for tag in &filter.tags {
        match tag {
            TagFilter::Pair(key, value) => {
                clause.push_str(
                    " AND EXISTS (SELECT 1 FROM asset_tags at JOIN tags t ON t.id = at.tag_id \
                     WHERE at.asset_id = assets.id AND t.key = ? AND t.value = ?)",
                );
                params.push(key.clone());
                params.push(value.clone());
            }
            TagFilter::Key(key) => {
                clause.push_str(
                    " AND EXISTS (SELECT 1 FROM asset_tags at JOIN tags t ON t.id = at.tag_id \
                     WHERE at.asset_id = assets.id AND t.key = ?)",
                );
                params.push(key.clone());
            }
        }
    }

    (clause, params)
}

#[async_trait]
impl AssetRepository for SqliteAssetRepository {
    async fn create(&self, record: &AssetRecord) -> Result<Asset, DbError> {
        let details = serde_json::to_string(&record.details)?;
        let now = format_timestamp(&Utc::now());

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO assets (asset_type, name, description, details, expires_at, search_text, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.details.asset_type().as_str())
        .bind(&record.name)
        .bind(&record.description)
        .bind(&details)
        .bind(record.details.expires_at().as_ref().map(format_timestamp))
        .bind(record.search_text())
        .bind(record.created_by)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        if let Some(tag_ids) = &record.tag_ids {
            replace_asset_tags(&mut *tx, id, tag_ids).await?;
        }
        if let Some(credentials) = &record.credentials {
            replace_credentials(&mut *tx, id, credentials).await?;
        }

        let asset = load_asset(&mut *tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Asset", id))?;
        tx.commit().await?;

        Ok(asset)
    }

    async fn get(&self, id: i64) -> Result<Option<Asset>, DbError> {
        let mut conn = self.pool.acquire().await?;
        load_asset(&mut *conn, id).await
    }

    async fn exists(&self, id: i64) -> Result<bool, DbError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM assets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn update(&self, id: i64, record: &AssetRecord) -> Result<Asset, DbError> {
        let details = serde_json::to_string(&record.details)?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE assets
            SET name = ?, description = ?, details = ?, expires_at = ?, search_text = ?, updated_at = ?
            WHERE id = ? AND asset_type = ?
            "#,
        )
        .bind(&record.name)
        .bind(&record.description)
        .bind(&details)
        .bind(record.details.expires_at().as_ref().map(format_timestamp))
        .bind(record.search_text())
        .bind(format_timestamp(&Utc::now()))
        .bind(id)
        .bind(record.details.asset_type().as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Asset", id));
        }

        if let Some(tag_ids) = &record.tag_ids {
            replace_asset_tags(&mut *tx, id, tag_ids).await?;
        }
        if let Some(credentials) = &record.credentials {
            replace_credentials(&mut *tx, id, credentials).await?;
        }

        let asset = load_asset(&mut *tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Asset", id))?;
        tx.commit().await?;

        Ok(asset)
    }

    async fn delete(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM assets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(
        &self,
        filter: &AssetFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Asset>, DbError> {
        let (clause, params) = filter_clause(filter);

        let count_query = format!("SELECT COUNT(*) FROM assets{}", clause);
        let mut count_sql = sqlx::query_scalar::<_, i64>(&count_query);
        for param in &params {
            count_sql = count_sql.bind(param);
        }
        let total: i64 = count_sql.fetch_one(&self.pool).await?;

        let query = format!(
            "SELECT {} FROM assets{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            ASSET_COLUMNS, clause
        );
        let mut sqlx_query = sqlx::query_as::<_, SqliteAssetRow>(&query);
        for param in &params {
            sqlx_query = sqlx_query.bind(param);
        }
        let rows = sqlx_query
            .bind(pagination.limit() as i64)
            .bind(pagination.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let items = self.attach_tags(rows).await?;
        Ok(PaginatedResult::new(items, total as u64, pagination))
    }

    async fn search(&self, filter: &AssetFilter) -> Result<Vec<Asset>, DbError> {
        let (clause, params) = filter_clause(filter);
        let query = format!(
            "SELECT {} FROM assets{} ORDER BY created_at DESC, id DESC",
            ASSET_COLUMNS, clause
        );
        let mut sqlx_query = sqlx::query_as::<_, SqliteAssetRow>(&query);
        for param in &params {
            sqlx_query = sqlx_query.bind(param);
        }
        let rows = sqlx_query.fetch_all(&self.pool).await?;

        self.attach_tags(rows).await
    }

    async fn list_all(&self) -> Result<Vec<Asset>, DbError> {
        let rows: Vec<SqliteAssetRow> =
            sqlx::query_as(&format!("SELECT {} FROM assets ORDER BY id ASC", ASSET_COLUMNS))
                .fetch_all(&self.pool)
                .await?;

        self.attach_tags(rows).await
    }

    async fn distinct_values(
        &self,
        asset_type: AssetType,
        field: &str,
    ) -> Result<Vec<String>, DbError> {
        let path = format!("$.{}", field);
        let values: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT json_extract(details, ?) AS value
            FROM assets
            WHERE asset_type = ?
              AND json_type(details, ?) = 'text'
              AND TRIM(json_extract(details, ?)) != ''
            ORDER BY value ASC
            "#,
        )
        .bind(&path)
        .bind(asset_type.as_str())
        .bind(&path)
        .bind(&path)
        .fetch_all(&self.pool)
        .await?;

        Ok(values)
    }

    async fn expiring(
        &self,
        asset_type: AssetType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Asset>, DbError> {
        let rows: Vec<SqliteAssetRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM assets
            WHERE asset_type = ? AND expires_at IS NOT NULL AND expires_at >= ? AND expires_at <= ?
            ORDER BY expires_at ASC, id ASC
            "#,
            ASSET_COLUMNS
        ))
        .bind(asset_type.as_str())
        .bind(format_timestamp(&from))
        .bind(format_timestamp(&to))
        .fetch_all(&self.pool)
        .await?;

        self.attach_tags(rows).await
    }
}

/// Creates the asset repository for a pool.
pub fn create_asset_repository(pool: &DbPool) -> Box<dyn AssetRepository> {
    Box::new(SqliteAssetRepository::new(pool.sqlite().clone()))
}

async fn load_asset(conn: &mut SqliteConnection, id: i64) -> Result<Option<Asset>, DbError> {
    let row: Option<SqliteAssetRow> =
        sqlx::query_as(&format!("SELECT {} FROM assets WHERE id = ?", ASSET_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut asset = Asset::try_from(row)?;
    asset.tags = load_asset_tags(&mut *conn, id).await?;
    asset.credentials = load_credentials(&mut *conn, id).await?;
    Ok(Some(asset))
}

#[derive(sqlx::FromRow)]
struct SqliteAssetRow {
    id: i64,
    asset_type: String,
    name: String,
    description: Option<String>,
    details: String,
    created_by: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SqliteAssetRow> for Asset {
    type Error = DbError;

    fn try_from(row: SqliteAssetRow) -> Result<Self, Self::Error> {
        let details: AssetDetails = serde_json::from_str(&row.details)?;
        if details.asset_type().as_str() != row.asset_type {
            return Err(DbError::Serialization(format!(
                "Asset {} details are tagged {} but the row is {}",
                row.id,
                details.asset_type(),
                row.asset_type
            )));
        }

        Ok(Asset {
            id: row.id,
            name: row.name,
            description: row.description,
            created_by: row.created_by,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            details,
            tags: Vec::new(),
            credentials: Vec::new(),
        })
    }
}
