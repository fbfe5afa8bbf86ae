//! Credential model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::validation::ValidationErrors;

/// What kind of secret a credential holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// `key` is a login name, `value` its password.
    Password,
    /// `key` is a login name, `value` a private key.
    SshKey,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Password => "password",
            CredentialKind::SshKey => "ssh_key",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CredentialKind {
    type Err = ValidationErrors;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "password" => Ok(CredentialKind::Password),
            "ssh_key" | "ssh-key" | "sshkey" => Ok(CredentialKind::SshKey),
            other => Err(ValidationErrors::single(
                "credential_type",
                format!("unknown credential type '{}'", other),
            )),
        }
    }
}

/// A login secret attached to an asset.
///
/// `value` holds ciphertext as loaded from the database; the credential
/// vault replaces it with plaintext or `"***"` before it leaves the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: i64,
    pub asset_id: i64,
    pub credential_type: CredentialKind,
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A credential as submitted by a caller, value in plaintext.
///
/// When updating an asset, an entry whose `id` names one of the asset's
/// existing credentials may leave `value` blank to keep the stored secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialInput {
    #[serde(default)]
    pub id: Option<i64>,
    pub credential_type: CredentialKind,
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CredentialInput {
    pub fn new(
        credential_type: CredentialKind,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            credential_type,
            key: key.into(),
            value: value.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
