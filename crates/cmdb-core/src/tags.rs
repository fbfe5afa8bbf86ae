//! Tag index: tag CRUD and asset tag associations.

use tracing::{debug, info};

use crate::auth::{AuthorizationContext, Permission};
use crate::db::{
    create_asset_repository, create_tag_repository, AssetRepository, DbPool, TagRepository,
};
use crate::error::{CmdbError, CmdbResult};
use crate::models::{Tag, TagInput};

/// Manages tags and which assets carry them.
pub struct TagIndex {
    tags: Box<dyn TagRepository>,
    assets: Box<dyn AssetRepository>,
}

impl TagIndex {
    pub fn new(pool: &DbPool) -> Self {
        Self {
            tags: create_tag_repository(pool),
            assets: create_asset_repository(pool),
        }
    }

    pub async fn list(&self, key: Option<&str>, value: Option<&str>) -> CmdbResult<Vec<Tag>> {
        debug!(?key, ?value, "Listing tags");
        Ok(self.tags.list(key, value).await?)
    }

    pub async fn create(&self, ctx: &AuthorizationContext, input: &TagInput) -> CmdbResult<Tag> {
        ctx.require(Permission::ManageAssets)?;
        let input = input.normalized()?;

        if self.tags.find_by_pair(&input.key, &input.value).await?.is_some() {
            return Err(duplicate(&input));
        }

        let tag = self.tags.create(&input).await?;
        info!(tag_id = tag.id, tag = %tag.label(), actor = %ctx.actor_name, "Tag created");
        Ok(tag)
    }

    pub async fn update(
        &self,
        ctx: &AuthorizationContext,
        id: i64,
        input: &TagInput,
    ) -> CmdbResult<Tag> {
        ctx.require(Permission::ManageAssets)?;
        let input = input.normalized()?;

        if self.tags.get(id).await?.is_none() {
            return Err(CmdbError::not_found("Tag", id));
        }
        if let Some(other) = self.tags.find_by_pair(&input.key, &input.value).await? {
            if other.id != id {
                return Err(duplicate(&input));
            }
        }

        let tag = self.tags.update(id, &input).await?;
        info!(tag_id = id, tag = %tag.label(), actor = %ctx.actor_name, "Tag updated");
        Ok(tag)
    }

    /// Deletes a tag; it disappears from every asset that carried it.
    pub async fn delete(&self, ctx: &AuthorizationContext, id: i64) -> CmdbResult<()> {
        ctx.require(Permission::ManageAssets)?;
        if !self.tags.delete(id).await? {
            return Err(CmdbError::not_found("Tag", id));
        }
        info!(tag_id = id, actor = %ctx.actor_name, "Tag deleted");
        Ok(())
    }

    pub async fn get_tags(&self, asset_id: i64) -> CmdbResult<Vec<Tag>> {
        self.require_asset(asset_id).await?;
        Ok(self.tags.tags_for_asset(asset_id).await?)
    }

    /// Replaces the tags of an asset.
    pub async fn set_tags(
        &self,
        ctx: &AuthorizationContext,
        asset_id: i64,
        tag_ids: &[i64],
    ) -> CmdbResult<Vec<Tag>> {
        ctx.require(Permission::ManageAssets)?;
        self.require_asset(asset_id).await?;
        let tag_ids = self.check_tag_ids(tag_ids).await?;

        self.tags.set_asset_tags(asset_id, &tag_ids).await?;
        info!(asset_id, count = tag_ids.len(), "Asset tags replaced");
        Ok(self.tags.tags_for_asset(asset_id).await?)
    }

    /// Adds tags to an asset, keeping the ones it already has.
    pub async fn add_tags(
        &self,
        ctx: &AuthorizationContext,
        asset_id: i64,
        tag_ids: &[i64],
    ) -> CmdbResult<Vec<Tag>> {
        ctx.require(Permission::ManageAssets)?;
        self.require_asset(asset_id).await?;
        let tag_ids = self.check_tag_ids(tag_ids).await?;

        self.tags.add_asset_tags(asset_id, &tag_ids).await?;
        info!(asset_id, count = tag_ids.len(), "Asset tags added");
        Ok(self.tags.tags_for_asset(asset_id).await?)
    }

    pub async fn remove_tag(
        &self,
        ctx: &AuthorizationContext,
        asset_id: i64,
        tag_id: i64,
    ) -> CmdbResult<()> {
        ctx.require(Permission::ManageAssets)?;
        self.require_asset(asset_id).await?;

        if !self.tags.remove_asset_tag(asset_id, tag_id).await? {
            return Err(CmdbError::not_found("Tag", tag_id));
        }
        info!(asset_id, tag_id, "Asset tag removed");
        Ok(())
    }

    /// Returns the tag with this pair, creating it when absent.
    pub async fn find_or_create(&self, key: &str, value: &str) -> CmdbResult<Tag> {
        let input = TagInput::new(key, value).normalized()?;
        if let Some(tag) = self.tags.find_by_pair(&input.key, &input.value).await? {
            return Ok(tag);
        }
        let tag = self.tags.create(&input).await?;
        info!(tag_id = tag.id, tag = %tag.label(), "Tag created on demand");
        Ok(tag)
    }

    /// Deduplicates `tag_ids` and fails with a validation error on `tag_ids`
    /// if any of them does not exist.
    pub async fn check_tag_ids(&self, tag_ids: &[i64]) -> CmdbResult<Vec<i64>> {
        let mut unique: Vec<i64> = Vec::with_capacity(tag_ids.len());
        for id in tag_ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }

        let existing = self.tags.existing_ids(&unique).await?;
        let missing: Vec<String> = unique
            .iter()
            .filter(|id| !existing.contains(id))
            .map(i64::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(CmdbError::invalid(
                "tag_ids",
                format!("unknown tag ids: {}", missing.join(", ")),
            ));
        }

        Ok(unique)
    }

    async fn require_asset(&self, asset_id: i64) -> CmdbResult<()> {
        if self.assets.exists(asset_id).await? {
            Ok(())
        } else {
            Err(CmdbError::not_found("Asset", asset_id))
        }
    }
}

fn duplicate(input: &TagInput) -> CmdbError {
    CmdbError::Conflict(format!(
        "Tag {}={} already exists",
        input.key, input.value
    ))
}
