//! Autocomplete suggestions derived from stored asset attributes.

use tracing::debug;

use crate::db::{create_asset_repository, AssetRepository, DbPool};
use crate::error::{CmdbError, CmdbResult};
use crate::models::AssetType;

/// Distinct values previously entered for whitelisted attributes.
pub struct FieldValueHistory {
    assets: Box<dyn AssetRepository>,
}

impl FieldValueHistory {
    pub fn new(pool: &DbPool) -> Self {
        Self {
            assets: create_asset_repository(pool),
        }
    }

    /// Sorted distinct non-blank values of `field` across assets of `asset_type`.
    pub async fn values(&self, asset_type: AssetType, field: &str) -> CmdbResult<Vec<String>> {
        let allowed = asset_type.suggestion_fields();
        if !allowed.contains(&field) {
            let message = if allowed.is_empty() {
                format!("{} assets have no suggestion fields", asset_type)
            } else {
                format!(
                    "field '{}' is not available for {} assets; expected one of: {}",
                    field,
                    asset_type,
                    allowed.join(", ")
                )
            };
            return Err(CmdbError::invalid("field", message));
        }

        let values = self.assets.distinct_values(asset_type, field).await?;
        debug!(%asset_type, field, count = values.len(), "Loaded field values");
        Ok(values)
    }
}
