//! Asset store.
//!
//! Owns the asset lifecycle: validation of the per-type attributes, checks
//! on referenced tags and cloud accounts, sealing of secrets on the way in
//! and masking on the way out. Every write goes through one repository
//! transaction so an asset never ends up with half of its credentials or
//! tags.

pub mod batch;

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::auth::{AuthorizationContext, Permission};
use crate::crypto::SecretCipher;
use crate::db::{
    create_asset_repository, create_cloud_account_repository, AssetRecord, AssetRepository,
    CloudAccountRepository, DbPool, PaginatedResult, Pagination,
};
use crate::error::{CmdbError, CmdbResult};
use crate::field_values::FieldValueHistory;
use crate::models::{Asset, AssetFilter, AssetInput, AssetType};
use crate::tags::TagIndex;
use crate::validation::normalize_optional;
use crate::vault::SecretBox;

pub use batch::{BatchImportResult, SheetRow};

/// Longest window accepted by [`AssetStore::expiring_soon`].
pub const MAX_EXPIRY_WINDOW_DAYS: i64 = 365;

/// The asset store.
pub struct AssetStore {
    assets: Box<dyn AssetRepository>,
    accounts: Box<dyn CloudAccountRepository>,
    tags: TagIndex,
    field_values: FieldValueHistory,
    secrets: SecretBox,
}

impl AssetStore {
    pub fn new(pool: &DbPool, cipher: Arc<dyn SecretCipher>) -> Self {
        Self {
            assets: create_asset_repository(pool),
            accounts: create_cloud_account_repository(pool),
            tags: TagIndex::new(pool),
            field_values: FieldValueHistory::new(pool),
            secrets: SecretBox::new(cipher),
        }
    }

    /// Lists one page of assets, newest first, tags attached.
    pub async fn list(
        &self,
        ctx: &AuthorizationContext,
        filter: &AssetFilter,
        pagination: &Pagination,
    ) -> CmdbResult<PaginatedResult<Asset>> {
        ctx.require(Permission::ViewAssets)?;
        debug!(
            asset_type = %filter.asset_type,
            search = ?filter.search,
            page = pagination.page,
            "Listing assets"
        );
        self.assets
            .list(filter, pagination)
            .await?
            .try_map(|asset| self.secrets.resolve_asset(ctx, asset))
    }

    /// Every asset matching `filter`, unpaged. Used by the CSV export.
    pub async fn search_all(
        &self,
        ctx: &AuthorizationContext,
        filter: &AssetFilter,
    ) -> CmdbResult<Vec<Asset>> {
        ctx.require(Permission::ViewAssets)?;
        self.assets
            .search(filter)
            .await?
            .into_iter()
            .map(|asset| self.secrets.resolve_asset(ctx, asset))
            .collect()
    }

    pub async fn get(&self, ctx: &AuthorizationContext, id: i64) -> CmdbResult<Asset> {
        ctx.require(Permission::ViewAssets)?;
        let asset = self.load(id).await?;
        self.secrets.resolve_asset(ctx, asset)
    }

    pub async fn create(&self, ctx: &AuthorizationContext, input: &AssetInput) -> CmdbResult<Asset> {
        ctx.require(Permission::ManageAssets)?;
        let record = self.prepare(ctx, input, None).await?;

        let asset = self.assets.create(&record).await?;
        metrics::counter!("cmdb_assets_created_total", "asset_type" => asset.asset_type().as_str())
            .increment(1);
        info!(
            asset_id = asset.id,
            asset_type = %asset.asset_type(),
            name = %asset.name,
            actor = %ctx.actor_name,
            "Asset created"
        );
        self.secrets.resolve_asset(ctx, asset)
    }

    /// Updates an asset. The type cannot change; `tag_ids` and
    /// `credentials` left out keep the current associations.
    pub async fn update(
        &self,
        ctx: &AuthorizationContext,
        id: i64,
        input: &AssetInput,
    ) -> CmdbResult<Asset> {
        ctx.require(Permission::ManageAssets)?;
        let current = self.load(id).await?;
        if input.details.asset_type() != current.asset_type() {
            return Err(CmdbError::invalid(
                "asset_type",
                format!(
                    "asset type cannot change from {} to {}",
                    current.asset_type(),
                    input.details.asset_type()
                ),
            ));
        }

        let record = self.prepare(ctx, input, Some(&current)).await?;
        let asset = self.assets.update(id, &record).await?;
        info!(asset_id = id, actor = %ctx.actor_name, "Asset updated");
        self.secrets.resolve_asset(ctx, asset)
    }

    /// Deletes an asset together with its credentials and tag links.
    pub async fn delete(&self, ctx: &AuthorizationContext, id: i64) -> CmdbResult<()> {
        ctx.require(Permission::ManageAssets)?;
        if !self.assets.delete(id).await? {
            return Err(CmdbError::not_found("Asset", id));
        }
        info!(asset_id = id, actor = %ctx.actor_name, "Asset deleted");
        Ok(())
    }

    pub async fn distinct_field_values(
        &self,
        ctx: &AuthorizationContext,
        asset_type: AssetType,
        field: &str,
    ) -> CmdbResult<Vec<String>> {
        ctx.require(Permission::ViewAssets)?;
        self.field_values.values(asset_type, field).await
    }

    /// Assets of `asset_type` expiring within the next `within_days` days,
    /// soonest first.
    pub async fn expiring_soon(
        &self,
        ctx: &AuthorizationContext,
        asset_type: AssetType,
        within_days: i64,
    ) -> CmdbResult<Vec<Asset>> {
        ctx.require(Permission::ViewAssets)?;
        if !asset_type.has_expiry() {
            return Err(CmdbError::invalid(
                "asset_type",
                format!("{} assets have no expiry date", asset_type),
            ));
        }
        if !(1..=MAX_EXPIRY_WINDOW_DAYS).contains(&within_days) {
            return Err(CmdbError::invalid(
                "days",
                format!("days must be between 1 and {}", MAX_EXPIRY_WINDOW_DAYS),
            ));
        }

        let now = Utc::now();
        let assets = self
            .assets
            .expiring(asset_type, now, now + Duration::days(within_days))
            .await?;
        debug!(%asset_type, within_days, count = assets.len(), "Loaded expiring assets");
        assets
            .into_iter()
            .map(|asset| self.secrets.resolve_asset(ctx, asset))
            .collect()
    }

    /// Creates one asset per spreadsheet row. Rows fail independently.
    pub async fn batch_import(
        &self,
        ctx: &AuthorizationContext,
        asset_type: AssetType,
        rows: &[SheetRow],
    ) -> CmdbResult<BatchImportResult> {
        ctx.require(Permission::ManageAssets)?;
        let mut result = BatchImportResult::default();

        for (index, row) in rows.iter().enumerate() {
            if batch::is_blank_row(row) {
                continue;
            }
            let row_number = index + 2;

            match self.import_row(ctx, asset_type, row).await {
                Ok(asset) => {
                    debug!(row = row_number, asset_id = asset.id, "Imported row");
                    result.created_count += 1;
                }
                Err(reason) => {
                    warn!(row = row_number, %reason, "Batch import row failed");
                    result.errors.push(format!("Row {}: {}", row_number, reason));
                }
            }
        }

        info!(
            %asset_type,
            created = result.created_count,
            failed = result.errors.len(),
            actor = %ctx.actor_name,
            "Batch import finished"
        );
        Ok(result)
    }

    async fn import_row(
        &self,
        ctx: &AuthorizationContext,
        asset_type: AssetType,
        row: &SheetRow,
    ) -> Result<Asset, String> {
        let mut draft = batch::convert_row(asset_type, row)?;
        // Tags are written on resolve, so the row must pass first.
        self.prepare(ctx, &draft.input, None)
            .await
            .map_err(|e| describe(&e))?;

        let mut tag_ids = Vec::with_capacity(draft.tags.len());
        for (key, value) in &draft.tags {
            let tag = self
                .tags
                .find_or_create(key, value)
                .await
                .map_err(|e| describe(&e))?;
            tag_ids.push(tag.id);
        }
        if !tag_ids.is_empty() {
            draft.input.tag_ids = Some(tag_ids);
        }

        self.create(ctx, &draft.input)
            .await
            .map_err(|e| describe(&e))
    }

    async fn load(&self, id: i64) -> CmdbResult<Asset> {
        self.assets
            .get(id)
            .await?
            .ok_or_else(|| CmdbError::not_found("Asset", id))
    }

    /// Validates an input and turns it into a storable record.
    ///
    /// With `current`, blank secrets keep their stored ciphertext.
    async fn prepare(
        &self,
        ctx: &AuthorizationContext,
        input: &AssetInput,
        current: Option<&Asset>,
    ) -> CmdbResult<AssetRecord> {
        let name = input.name.trim().to_string();

        let mut details = input.details.clone();
        details.normalize();
        self.secrets.seal_details(&mut details)?;
        if let Some(current) = current {
            details.keep_blank_secrets(&current.details);
        }

        let mut errors = details.validate();
        errors.require("name", Some(&name));
        errors.into_result()?;

        if let Some(account_id) = details.cloud_account_id() {
            if !self.accounts.exists(account_id).await? {
                return Err(CmdbError::invalid(
                    "cloud_account_id",
                    format!("cloud account {} does not exist", account_id),
                ));
            }
        }

        let tag_ids = match &input.tag_ids {
            Some(ids) => Some(self.tags.check_tag_ids(ids).await?),
            None => None,
        };

        let credentials = match &input.credentials {
            Some(inputs) => {
                let existing = current.map(|a| a.credentials.as_slice()).unwrap_or_default();
                Some(self.secrets.seal_credentials(inputs, existing)?)
            }
            None => None,
        };

        Ok(AssetRecord {
            name,
            description: normalize_optional(input.description.clone()),
            created_by: match current {
                Some(asset) => asset.created_by,
                None => ctx.actor_id,
            },
            details,
            tag_ids,
            credentials,
        })
    }
}

/// One-line reason for a failed import row.
fn describe(err: &CmdbError) -> String {
    match err {
        CmdbError::Validation(errors) => errors.summary(),
        other => other.to_string(),
    }
}
