//! Migration engine: moves the whole entity graph between databases.
//!
//! [`MigrationEngine::export`] produces a [`Snapshot`], a portable JSON
//! document in which every record keeps its source id and secrets stay
//! ciphertext. [`MigrationEngine::import`] replays a snapshot into another
//! database, deduplicating users, tags and cloud accounts by natural key and
//! rewriting every reference through an [`IdRemap`].

mod export;
mod import;

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{AuthorizationContext, Permission};
use crate::db::{
    create_asset_repository, create_cloud_account_repository, create_credential_repository,
    create_tag_repository, create_user_repository, AssetRepository, CloudAccountRepository,
    CredentialRepository, DbPool, TagRepository, UserRepository,
};
use crate::error::{CmdbError, CmdbResult};
use crate::models::{AssetDetails, CredentialKind};

/// Version written into every snapshot.
pub const SNAPSHOT_VERSION: &str = "1.0.0";

/// Major snapshot version this build can import.
pub const SUPPORTED_MAJOR_VERSION: u64 = 1;

/// A portable export of the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    pub export_time: DateTime<Utc>,
    pub data: SnapshotData,
}

/// Record sections of a snapshot. Records stay raw JSON until import so one
/// malformed record fails alone; they decode into the `Snapshot*` types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotData {
    pub users: Vec<Value>,
    pub tags: Vec<Value>,
    pub assets: Vec<Value>,
    pub credentials: Vec<Value>,
    pub cloud_accounts: Vec<Value>,
}

/// A user without its password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotUser {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// An asset with its details (secrets as ciphertext) and source tag ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotAsset {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub details: AssetDetails,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

/// A credential of an asset; `value` is ciphertext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotCredential {
    pub id: i64,
    pub asset_id: i64,
    pub credential_type: CredentialKind,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A cloud account with nested keys; `password` and secrets are ciphertext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotCloudAccount {
    pub id: i64,
    pub cloud_provider: String,
    pub account_name: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub balance: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub access_keys: Vec<SnapshotAccessKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotAccessKey {
    pub id: i64,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Snapshot {
    /// Parses a snapshot document, rejecting unsupported versions before
    /// looking at the data.
    pub fn from_json(bytes: &[u8]) -> CmdbResult<Snapshot> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| CmdbError::invalid("file", format!("invalid JSON: {}", e)))?;

        let version = value
            .get("version")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CmdbError::invalid("version", "snapshot version is missing"))?;
        check_version(version)?;
        if !value.get("data").map_or(false, Value::is_object) {
            return Err(CmdbError::invalid("data", "snapshot data is missing"));
        }

        serde_json::from_value(value)
            .map_err(|e| CmdbError::invalid("file", format!("invalid snapshot: {}", e)))
    }
}

/// Fails unless `version` has the supported major number.
pub fn check_version(version: &str) -> CmdbResult<()> {
    let major = version
        .trim()
        .split('.')
        .next()
        .and_then(|m| m.parse::<u64>().ok())
        .ok_or_else(|| {
            CmdbError::invalid("version", format!("malformed snapshot version '{}'", version))
        })?;

    if major != SUPPORTED_MAJOR_VERSION {
        return Err(CmdbError::invalid(
            "version",
            format!(
                "unsupported snapshot version {} (supported: {}.x)",
                version, SUPPORTED_MAJOR_VERSION
            ),
        ));
    }
    Ok(())
}

/// Kinds of records carried in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Tag,
    Asset,
    Credential,
    CloudAccount,
    AccessKey,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Tag => "tag",
            EntityKind::Asset => "asset",
            EntityKind::Credential => "credential",
            EntityKind::CloudAccount => "cloud_account",
            EntityKind::AccessKey => "access_key",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source id to destination id, per entity kind.
#[derive(Debug, Clone, Default)]
pub struct IdRemap {
    ids: HashMap<(EntityKind, i64), i64>,
}

impl IdRemap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: EntityKind, source: i64, destination: i64) {
        self.ids.insert((kind, source), destination);
    }

    pub fn get(&self, kind: EntityKind, source: i64) -> Option<i64> {
        self.ids.get(&(kind, source)).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A record that could not be imported. Collected, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecordError {
    pub entity: EntityKind,
    /// Human-readable handle of the source record (id, name or natural key).
    pub reference: String,
    pub reason: String,
}

/// Per-entity record counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCounts {
    pub users: usize,
    pub tags: usize,
    pub assets: usize,
    pub credentials: usize,
    pub cloud_accounts: usize,
}

impl ImportCounts {
    pub fn total(&self) -> usize {
        self.users + self.tags + self.assets + self.credentials + self.cloud_accounts
    }

    fn bump(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::User => self.users += 1,
            EntityKind::Tag => self.tags += 1,
            EntityKind::Asset => self.assets += 1,
            EntityKind::Credential => self.credentials += 1,
            EntityKind::CloudAccount => self.cloud_accounts += 1,
            EntityKind::AccessKey => {}
        }
    }
}

/// Summary of an import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub message: String,
    pub imported: ImportCounts,
    pub skipped: ImportCounts,
    pub errors: Vec<ImportRecordError>,
}

/// Exports and imports snapshots.
pub struct MigrationEngine {
    users: Box<dyn UserRepository>,
    tags: Box<dyn TagRepository>,
    assets: Box<dyn AssetRepository>,
    credentials: Box<dyn CredentialRepository>,
    accounts: Box<dyn CloudAccountRepository>,
}

impl MigrationEngine {
    pub fn new(pool: &DbPool) -> Self {
        Self {
            users: create_user_repository(pool),
            tags: create_tag_repository(pool),
            assets: create_asset_repository(pool),
            credentials: create_credential_repository(pool),
            accounts: create_cloud_account_repository(pool),
        }
    }

    /// Walks every table into a snapshot. Secrets are copied as ciphertext.
    pub async fn export(&self, ctx: &AuthorizationContext) -> CmdbResult<Snapshot> {
        ctx.require(Permission::RunMigrations)?;
        export::run(self, ctx).await
    }

    /// Replays a snapshot. Only a version mismatch or a missing permission
    /// fails the whole run; record failures end up in
    /// [`ImportResult::errors`].
    pub async fn import(
        &self,
        ctx: &AuthorizationContext,
        snapshot: &Snapshot,
    ) -> CmdbResult<ImportResult> {
        ctx.require(Permission::RunMigrations)?;
        check_version(&snapshot.version)?;
        Ok(import::run(self, ctx, snapshot).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_version() {
        assert!(check_version("1.0.0").is_ok());
        assert!(check_version("1.7").is_ok());
        assert!(check_version("2.0.0").is_err());
        assert!(check_version("v1").is_err());
    }

    #[test]
    fn test_from_json_rejects_before_parsing_data() {
        let doc = br#"{"version": "2.0.0", "export_time": "x", "data": 42}"#;
        match Snapshot::from_json(doc) {
            Err(CmdbError::Validation(errors)) => {
                assert!(errors.message_for("version").is_some())
            }
            other => panic!("unexpected result {:?}", other),
        }

        assert!(Snapshot::from_json(b"not json").is_err());
        assert!(Snapshot::from_json(br#"{"version": "1.0.0"}"#).is_err());
    }

    #[test]
    fn test_from_json_tolerates_missing_sections() {
        let doc = br#"{
            "version": "1.0.0",
            "export_time": "2024-05-01T00:00:00Z",
            "data": {"tags": [{"id": 3, "key": "env", "value": "prod", "created_at": "2024-05-01T00:00:00Z"}]}
        }"#;
        let snapshot = Snapshot::from_json(doc).unwrap();
        assert_eq!(snapshot.data.tags.len(), 1);
        assert!(snapshot.data.assets.is_empty());
    }

    #[test]
    fn test_from_json_defers_record_decoding() {
        let doc = br#"{
            "version": "1.0.0",
            "export_time": "2024-05-01T00:00:00Z",
            "data": {"assets": [
                {"id": 1, "name": "web", "asset_type": "server",
                 "created_at": "2024-05-01T00:00:00Z", "updated_at": "2024-05-01T00:00:00Z"},
                {"id": 2, "name": "lp", "asset_type": "printer"}
            ]}
        }"#;
        let snapshot = Snapshot::from_json(doc).unwrap();
        assert_eq!(snapshot.data.assets.len(), 2);
        assert!(serde_json::from_value::<SnapshotAsset>(snapshot.data.assets[0].clone()).is_ok());
        assert!(serde_json::from_value::<SnapshotAsset>(snapshot.data.assets[1].clone()).is_err());
    }

    #[test]
    fn test_id_remap() {
        let mut remap = IdRemap::new();
        remap.insert(EntityKind::Tag, 1, 10);
        remap.insert(EntityKind::Asset, 1, 20);
        assert_eq!(remap.get(EntityKind::Tag, 1), Some(10));
        assert_eq!(remap.get(EntityKind::Asset, 1), Some(20));
        assert_eq!(remap.get(EntityKind::User, 1), None);
        assert_eq!(remap.len(), 2);
    }
}
