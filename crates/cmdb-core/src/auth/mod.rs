//! Authentication and authorization types for the CMDB.
//!
//! This module provides:
//! - User and Role definitions
//! - API keys, the bearer credential accepted by the HTTP API
//! - Password hashing utilities
//! - The authorization context threaded through every store operation

pub mod password;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CmdbError;

/// Fine-grained permissions checked by the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Read assets, tags and cloud accounts (secrets masked).
    ViewAssets,
    /// Create, update and delete assets, tags and cloud accounts.
    ManageAssets,
    /// Read decrypted secrets and delete credentials.
    RevealSecrets,
    /// Manage users and their API keys.
    ManageUsers,
    /// Export and import migration snapshots.
    RunMigrations,
}

impl Permission {
    /// Returns all available permissions.
    pub fn all() -> HashSet<Permission> {
        HashSet::from([
            Permission::ViewAssets,
            Permission::ManageAssets,
            Permission::RevealSecrets,
            Permission::ManageUsers,
            Permission::RunMigrations,
        ])
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewAssets => "view_assets",
            Permission::ManageAssets => "manage_assets",
            Permission::RevealSecrets => "reveal_secrets",
            Permission::ManageUsers => "manage_users",
            Permission::RunMigrations => "run_migrations",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity and permissions of the caller of a store operation.
///
/// Built once per request from the authenticated user and passed explicitly
/// to every store call that reads secrets or mutates data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationContext {
    /// User id of the actor; `None` for the system actor.
    pub actor_id: Option<i64>,
    /// Human-readable actor name for logs.
    pub actor_name: String,
    /// The actor's role.
    pub role: Role,
    /// Permissions granted to this actor.
    pub permissions: HashSet<Permission>,
}

impl AuthorizationContext {
    /// Creates a context for an authenticated user.
    pub fn from_user(user: &User) -> Self {
        Self {
            actor_id: Some(user.id),
            actor_name: user.username.clone(),
            role: user.role,
            permissions: Self::permissions_for_role(user.role),
        }
    }

    /// Creates a context for operator tooling (CLI export/import, seeding).
    pub fn system() -> Self {
        Self {
            actor_id: None,
            actor_name: "system".to_string(),
            role: Role::Admin,
            permissions: Permission::all(),
        }
    }

    /// Returns the permissions for a given role.
    pub fn permissions_for_role(role: Role) -> HashSet<Permission> {
        match role {
            Role::Admin => Permission::all(),
            Role::User => HashSet::from([Permission::ViewAssets, Permission::ManageAssets]),
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Whether secrets may be returned in plaintext to this actor.
    pub fn can_reveal_secrets(&self) -> bool {
        self.has_permission(Permission::RevealSecrets)
    }

    /// Fails with [`CmdbError::Forbidden`] unless the permission is held.
    pub fn require(&self, permission: Permission) -> Result<(), CmdbError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(CmdbError::Forbidden(format!(
                "User '{}' (role: {}) lacks required permission: {}",
                self.actor_name, self.role, permission
            )))
        }
    }
}

/// User role for role-based access control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access, including secrets, users and migration.
    Admin,
    /// Day-to-day asset management; secrets are masked.
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Maps the `is_admin` flag used in migration snapshots to a role.
    pub fn from_admin_flag(is_admin: bool) -> Self {
        if is_admin {
            Role::Admin
        } else {
            Role::User
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(()),
        }
    }
}

/// A user of the CMDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Surrogate id, assigned by the database.
    pub id: i64,
    /// Username for login (unique, the natural key on import).
    pub username: String,
    pub email: Option<String>,
    /// Argon2 password hash. Users created by an import have none.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: Role,
    /// Whether the account is enabled.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Creates an unsaved user; `id` is assigned on insert.
    pub fn new(
        username: impl Into<String>,
        email: Option<String>,
        password_hash: Option<String>,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username: username.into(),
            email,
            password_hash,
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Update fields for a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub email: Option<Option<String>>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// An API key for bearer authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    /// User who owns this key.
    pub user_id: i64,
    /// Descriptive name for the key.
    pub name: String,
    /// SHA-256 hash of the full key.
    #[serde(skip_serializing)]
    pub key_hash: String,
    /// Prefix of the key for lookup (e.g. "cmdb_ab12cd").
    pub key_prefix: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Prefix shared by every raw key.
    pub const KEY_PREFIX: &'static str = "cmdb_";

    const CHARSET: &'static [u8] =
        b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    /// Creates a new API key. Returns the key struct and the raw key value,
    /// which is shown once and never stored.
    pub fn new(user_id: i64, name: impl Into<String>) -> (Self, String) {
        use rand::rngs::OsRng;
        use rand::Rng;

        // cmdb_<prefix>_<secret>
        let prefix: String = (0..6)
            .map(|_| Self::CHARSET[OsRng.gen_range(0..Self::CHARSET.len())] as char)
            .collect();
        let secret: String = (0..32)
            .map(|_| Self::CHARSET[OsRng.gen_range(0..Self::CHARSET.len())] as char)
            .collect();

        let raw_key = format!("{}{}_{}", Self::KEY_PREFIX, prefix, secret);
        let key_prefix = format!("{}{}", Self::KEY_PREFIX, prefix);

        let api_key = Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            key_hash: Self::hash(&raw_key),
            key_prefix,
            expires_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        };

        (api_key, raw_key)
    }

    /// Extracts the lookup prefix (`cmdb_xxxxxx`) from a raw key.
    pub fn prefix_of(raw_key: &str) -> Option<&str> {
        let rest = raw_key.strip_prefix(Self::KEY_PREFIX)?;
        let end = rest.find('_')?;
        Some(&raw_key[..Self::KEY_PREFIX.len() + end])
    }

    fn hash(raw_key: &str) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(raw_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Verifies that a raw key matches this API key's hash.
    pub fn verify(&self, raw_key: &str) -> bool {
        use subtle::ConstantTimeEq;

        Self::hash(raw_key)
            .as_bytes()
            .ct_eq(self.key_hash.as_bytes())
            .into()
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| exp < Utc::now()).unwrap_or(false)
    }
}

pub use password::{hash_password, verify_password, PasswordError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_permissions() {
        let admin = AuthorizationContext::permissions_for_role(Role::Admin);
        let user = AuthorizationContext::permissions_for_role(Role::User);

        assert!(admin.contains(&Permission::RevealSecrets));
        assert!(admin.contains(&Permission::RunMigrations));
        assert!(user.contains(&Permission::ManageAssets));
        assert!(!user.contains(&Permission::RevealSecrets));
        assert!(!user.contains(&Permission::ManageUsers));
    }

    #[test]
    fn test_context_require() {
        let user = User::new("alice", None, None, Role::User);
        let ctx = AuthorizationContext::from_user(&user);

        assert!(!ctx.can_reveal_secrets());
        assert!(ctx.require(Permission::ViewAssets).is_ok());
        assert!(matches!(
            ctx.require(Permission::RunMigrations),
            Err(CmdbError::Forbidden(_))
        ));
        assert!(AuthorizationContext::system().can_reveal_secrets());
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("user".parse::<Role>(), Ok(Role::User));
        assert!("viewer".parse::<Role>().is_err());
        assert_eq!(Role::from_admin_flag(true), Role::Admin);
        assert_eq!(Role::from_admin_flag(false), Role::User);
    }

    #[test]
    fn test_api_key_generation_and_verify() {
        let (key, raw) = ApiKey::new(7, "ci");

        assert!(raw.starts_with("cmdb_"));
        assert!(raw.starts_with(&key.key_prefix));
        assert_eq!(key.key_prefix.len(), "cmdb_".len() + 6);
        assert!(key.verify(&raw));
        assert!(!key.verify("cmdb_wrong_key"));
        assert!(!key.is_expired());
    }

    #[test]
    fn test_prefix_of() {
        let (key, raw) = ApiKey::new(1, "test");
        assert_eq!(ApiKey::prefix_of(&raw), Some(key.key_prefix.as_str()));
        assert_eq!(ApiKey::prefix_of("other_abc_def"), None);
        assert_eq!(ApiKey::prefix_of("cmdb_nounderscore"), None);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("bob", None, Some("$argon2id$...".into()), Role::Admin);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"role\":\"admin\""));
    }
}
