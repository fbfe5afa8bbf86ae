//! # cmdb-core
//!
//! Domain model and stores for the CMDB.
//!
//! This crate holds the asset/credential/tag data model, the SQLite
//! repositories behind it, the stores that enforce validation and secret
//! handling on top of them, and the migration engine that moves the whole
//! graph between databases.

pub mod asset_store;
pub mod auth;
pub mod cloud_accounts;
pub mod crypto;
pub mod db;
pub mod error;
pub mod field_values;
pub mod migration;
pub mod models;
pub mod tabular;
pub mod tags;
pub mod validation;
pub mod vault;

pub use asset_store::{AssetStore, BatchImportResult, SheetRow};
pub use cloud_accounts::CloudAccountRegistry;
pub use crypto::{create_cipher, AesGcmCipher, CryptoError, PlaintextCipher, SecretCipher};
pub use error::{CmdbError, CmdbResult};
pub use field_values::FieldValueHistory;
pub use migration::{
    EntityKind, IdRemap, ImportRecordError, ImportResult, MigrationEngine, Snapshot,
};
pub use models::{
    AccessKey, AccessKeyInput, Asset, AssetDetails, AssetFilter, AssetInput, AssetType,
    CloudAccount, CloudAccountInput, Credential, CredentialInput, CredentialKind, Tag, TagFilter,
    TagInput,
};
pub use tags::TagIndex;
pub use validation::{FieldError, ValidationErrors};
pub use vault::{CredentialVault, SecretBox, SECRET_MASK};

// Auth exports
pub use auth::password::{
    hash_password, validate_password_strength, verify_password, PasswordError,
};
pub use auth::{ApiKey, AuthorizationContext, Permission, Role, User, UserUpdate};
