//! Tag repository for database operations.

use super::{format_timestamp, parse_timestamp, DbError, DbPool};
use crate::models::{Tag, TagInput};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqliteConnection;
use std::collections::HashMap;

/// Repository trait for tags and their asset associations.
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Creates a tag. A duplicate `(key, value)` is a `Constraint` error.
    async fn create(&self, input: &TagInput) -> Result<Tag, DbError>;

    async fn get(&self, id: i64) -> Result<Option<Tag>, DbError>;

    async fn find_by_pair(&self, key: &str, value: &str) -> Result<Option<Tag>, DbError>;

    /// Lists tags with optional exact-match filters, ordered by key then value.
    async fn list(&self, key: Option<&str>, value: Option<&str>) -> Result<Vec<Tag>, DbError>;

    async fn update(&self, id: i64, input: &TagInput) -> Result<Tag, DbError>;

    /// Deletes a tag and, through the cascade, its associations.
    async fn delete(&self, id: i64) -> Result<bool, DbError>;

    /// Returns the subset of `ids` that exist.
    async fn existing_ids(&self, ids: &[i64]) -> Result<Vec<i64>, DbError>;

    async fn tags_for_asset(&self, asset_id: i64) -> Result<Vec<Tag>, DbError>;

    /// Loads the tags of many assets at once.
    async fn tags_for_assets(&self, asset_ids: &[i64]) -> Result<HashMap<i64, Vec<Tag>>, DbError>;

    /// Replaces the tag set of an asset.
    async fn set_asset_tags(&self, asset_id: i64, tag_ids: &[i64]) -> Result<(), DbError>;

    /// Adds tags to an asset, ignoring ones already attached.
    async fn add_asset_tags(&self, asset_id: i64, tag_ids: &[i64]) -> Result<(), DbError>;

    async fn remove_asset_tag(&self, asset_id: i64, tag_id: i64) -> Result<bool, DbError>;
}

/// SQLite implementation of TagRepository.
pub struct SqliteTagRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteTagRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TagRepository for SqliteTagRepository {
    async fn create(&self, input: &TagInput) -> Result<Tag, DbError> {
        let now = Utc::now();
        let result = sqlx::query("INSERT INTO tags (key, value, created_at) VALUES (?, ?, ?)")
            .bind(&input.key)
            .bind(&input.value)
            .bind(format_timestamp(&now))
            .execute(&self.pool)
            .await?;

        Ok(Tag {
            id: result.last_insert_rowid(),
            key: input.key.clone(),
            value: input.value.clone(),
            created_at: now,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<Tag>, DbError> {
        let row: Option<SqliteTagRow> =
            sqlx::query_as("SELECT id, key, value, created_at FROM tags WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_by_pair(&self, key: &str, value: &str) -> Result<Option<Tag>, DbError> {
        let row: Option<SqliteTagRow> = sqlx::query_as(
            "SELECT id, key, value, created_at FROM tags WHERE key = ? AND value = ?",
        )
        .bind(key)
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, key: Option<&str>, value: Option<&str>) -> Result<Vec<Tag>, DbError> {
        let mut query = String::from("SELECT id, key, value, created_at FROM tags WHERE 1=1");
        let mut params: Vec<&str> = Vec::new();

        if let Some(key) = key {
            query.push_str(" AND key = ?");
            params.push(key);
        }
        if let Some(value) = value {
            query.push_str(" AND value = ?");
            params.push(value);
        }
        query.push_str(" ORDER BY key ASC, value ASC");

        let mut sqlx_query = sqlx::query_as::<_, SqliteTagRow>(&query);
        for param in params {
            sqlx_query = sqlx_query.bind(param);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update(&self, id: i64, input: &TagInput) -> Result<Tag, DbError> {
        let result = sqlx::query("UPDATE tags SET key = ?, value = ? WHERE id = ?")
            .bind(&input.key)
            .bind(&input.value)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Tag", id));
        }

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Tag", id))
    }

    async fn delete(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn existing_ids(&self, ids: &[i64]) -> Result<Vec<i64>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT id FROM tags WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut sqlx_query = sqlx::query_scalar::<_, i64>(&query);
        for id in ids {
            sqlx_query = sqlx_query.bind(id);
        }

        Ok(sqlx_query.fetch_all(&self.pool).await?)
    }

    async fn tags_for_asset(&self, asset_id: i64) -> Result<Vec<Tag>, DbError> {
        let mut conn = self.pool.acquire().await?;
        load_asset_tags(&mut *conn, asset_id).await
    }

    async fn tags_for_assets(&self, asset_ids: &[i64]) -> Result<HashMap<i64, Vec<Tag>>, DbError> {
        let mut conn = self.pool.acquire().await?;
        load_tags_for_assets(&mut *conn, asset_ids).await
    }

    async fn set_asset_tags(&self, asset_id: i64, tag_ids: &[i64]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        replace_asset_tags(&mut *tx, asset_id, tag_ids).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn add_asset_tags(&self, asset_id: i64, tag_ids: &[i64]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        insert_asset_tags(&mut *tx, asset_id, tag_ids).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_asset_tag(&self, asset_id: i64, tag_id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM asset_tags WHERE asset_id = ? AND tag_id = ?")
            .bind(asset_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Creates the tag repository for a pool.
pub fn create_tag_repository(pool: &DbPool) -> Box<dyn TagRepository> {
    Box::new(SqliteTagRepository::new(pool.sqlite().clone()))
}

/// `?, ?, ?` for an IN clause.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub(crate) async fn load_asset_tags(
    conn: &mut SqliteConnection,
    asset_id: i64,
) -> Result<Vec<Tag>, DbError> {
    let rows: Vec<SqliteTagRow> = sqlx::query_as(
        r#"
        SELECT t.id, t.key, t.value, t.created_at
        FROM tags t JOIN asset_tags at ON at.tag_id = t.id
        WHERE at.asset_id = ?
        ORDER BY t.key ASC, t.value ASC
        "#,
    )
    .bind(asset_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

pub(crate) async fn load_tags_for_assets(
    conn: &mut SqliteConnection,
    asset_ids: &[i64],
) -> Result<HashMap<i64, Vec<Tag>>, DbError> {
    let mut by_asset: HashMap<i64, Vec<Tag>> = HashMap::new();
    if asset_ids.is_empty() {
        return Ok(by_asset);
    }

    let query = format!(
        r#"
        SELECT at.asset_id, t.id, t.key, t.value, t.created_at
        FROM asset_tags at JOIN tags t ON t.id = at.tag_id
        WHERE at.asset_id IN ({})
        ORDER BY t.key ASC, t.value ASC
        "#,
        placeholders(asset_ids.len())
    );
    let mut sqlx_query = sqlx::query_as::<_, SqliteAssetTagRow>(&query);
    for id in asset_ids {
        sqlx_query = sqlx_query.bind(id);
    }

    for row in sqlx_query.fetch_all(&mut *conn).await? {
        let asset_id = row.asset_id;
        let tag = Tag::try_from(SqliteTagRow {
            id: row.id,
            key: row.key,
            value: row.value,
            created_at: row.created_at,
        })?;
        by_asset.entry(asset_id).or_default().push(tag);
    }

    Ok(by_asset)
}

pub(crate) async fn insert_asset_tags(
    conn: &mut SqliteConnection,
    asset_id: i64,
    tag_ids: &[i64],
) -> Result<(), DbError> {
    for tag_id in tag_ids {
        sqlx::query("INSERT OR IGNORE INTO asset_tags (asset_id, tag_id) VALUES (?, ?)")
            .bind(asset_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub(crate) async fn replace_asset_tags(
    conn: &mut SqliteConnection,
    asset_id: i64,
    tag_ids: &[i64],
) -> Result<(), DbError> {
    sqlx::query("DELETE FROM asset_tags WHERE asset_id = ?")
        .bind(asset_id)
        .execute(&mut *conn)
        .await?;
    insert_asset_tags(conn, asset_id, tag_ids).await
}

#[derive(sqlx::FromRow)]
struct SqliteTagRow {
    id: i64,
    key: String,
    value: String,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct SqliteAssetTagRow {
    asset_id: i64,
    id: i64,
    key: String,
    value: String,
    created_at: String,
}

impl TryFrom<SqliteTagRow> for Tag {
    type Error = DbError;

    fn try_from(row: SqliteTagRow) -> Result<Self, Self::Error> {
        Ok(Tag {
            id: row.id,
            key: row.key,
            value: row.value,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
