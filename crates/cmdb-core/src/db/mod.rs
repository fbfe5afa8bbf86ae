//! Database layer for the CMDB.
//!
//! This module provides SQLite persistence for users, tags, assets,
//! credentials and cloud accounts using SQLx. Repositories store secrets
//! exactly as handed to them; encryption and masking happen one level up.

mod error;
mod pagination;
mod pool;
mod schema;

pub mod api_key_repo;
pub mod asset_repo;
pub mod cloud_account_repo;
pub mod credential_repo;
pub mod seed;
pub mod tag_repo;
pub mod user_repo;

use chrono::{DateTime, SecondsFormat, Utc};

pub use error::DbError;
pub use pagination::{PaginatedResult, Pagination, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use pool::{
    create_in_memory_pool, create_pool, create_pool_with_options, escape_like_pattern,
    make_like_pattern, DbPool, PoolOptions,
};
pub use schema::run_migrations;

// Re-export repository traits and types
pub use api_key_repo::ApiKeyRepository;
pub use asset_repo::{AssetRecord, AssetRepository};
pub use cloud_account_repo::{AccessKeyRecord, CloudAccountRecord, CloudAccountRepository};
pub use credential_repo::{CredentialRepository, NewCredential};
pub use tag_repo::TagRepository;
pub use user_repo::UserRepository;

// Re-export factory functions
pub use api_key_repo::create_api_key_repository;
pub use asset_repo::create_asset_repository;
pub use cloud_account_repo::create_cloud_account_repository;
pub use credential_repo::create_credential_repository;
pub use tag_repo::create_tag_repository;
pub use user_repo::create_user_repository;

/// Formats a timestamp for storage.
///
/// Fixed-width UTC RFC3339 so that string comparison in SQL orders the same
/// way as the instants themselves.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp.
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Serialization(format!("Invalid timestamp: {}", e)))
}

pub(crate) fn parse_optional_timestamp(s: Option<String>) -> Result<Option<DateTime<Utc>>, DbError> {
    s.as_deref().map(parse_timestamp).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format_is_sortable() {
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 11, 2, 3, 4, 5).unwrap();
        let (a, b) = (format_timestamp(&early), format_timestamp(&late));
        assert!(a < b);
        assert_eq!(a, "2024-01-02T03:04:05.000000Z");
        assert_eq!(parse_timestamp(&a).unwrap(), early);
    }

    #[test]
    fn test_parse_invalid_timestamp() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(DbError::Serialization(_))
        ));
        assert_eq!(parse_optional_timestamp(None).unwrap(), None);
    }
}
