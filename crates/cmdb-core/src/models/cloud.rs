//! Cloud provider accounts and their access keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::ValidationErrors;
use crate::vault::is_unchanged_secret;

/// An account at a cloud provider.
///
/// `password` and every access key's `secret_key` hold ciphertext as loaded
/// from the database, and plaintext or `"***"` once resolved for a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudAccount {
    pub id: i64,
    /// aliyun, tencent, aws, ...
    pub cloud_provider: String,
    pub account_name: String,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub balance: Option<f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub access_keys: Vec<AccessKey>,
}

/// An API access key pair belonging to exactly one cloud account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    pub id: i64,
    pub cloud_account_id: i64,
    pub access_key: String,
    pub secret_key: String,
    /// Who the key was handed out to.
    pub assigned_to: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating or updating a cloud account.
///
/// A blank `password` on update keeps the stored password. `access_keys:
/// None` on update leaves the keys untouched; `Some` replaces them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudAccountInput {
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
    #[serde(default)]
    pub access_keys: Option<Vec<AccessKeyInput>>,
}

impl CloudAccountInput {
    pub fn new(cloud_provider: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            cloud_provider: cloud_provider.into(),
            account_name: account_name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        errors.require("cloud_provider", Some(&self.cloud_provider));
        errors.require("account_name", Some(&self.account_name));
        if let Some(balance) = self.balance {
            if !balance.is_finite() || balance < 0.0 {
                errors.add("balance", "balance must be >= 0");
            }
        }
        if let Some(keys) = &self.access_keys {
            for (i, key) in keys.iter().enumerate() {
                if key.access_key.trim().is_empty() {
                    errors.add(format!("access_keys[{}].access_key", i), "access_key is required");
                }
            }
        }
        errors
    }
}

/// Payload for an access key; the secret is plaintext.
///
/// A blank or absent `secret_key` on update keeps the stored secret. `id`
/// names an existing key when keys are replaced through an account update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKeyInput {
    #[serde(default)]
    pub id: Option<i64>,
    pub access_key: String,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl AccessKeyInput {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: Some(secret_key.into()),
            ..Default::default()
        }
    }

    /// The secret if one was supplied, `None` when blank or masked.
    pub fn supplied_secret(&self) -> Option<&str> {
        self.secret_key
            .as_deref()
            .filter(|s| !is_unchanged_secret(s))
            .map(str::trim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let mut input = CloudAccountInput::new("aliyun", "");
        input.balance = Some(-1.0);
        let errors = input.validate();
        assert!(errors.message_for("account_name").is_some());
        assert!(errors.message_for("balance").is_some());

        let ok = CloudAccountInput::new("aws", "prod");
        assert!(ok.validate().is_empty());
    }

    #[test]
    fn test_supplied_secret() {
        let mut key = AccessKeyInput::new("AKID", "  ");
        assert_eq!(key.supplied_secret(), None);
        key.secret_key = Some("s3cr3t".into());
        assert_eq!(key.supplied_secret(), Some("s3cr3t"));
        key.secret_key = None;
        assert_eq!(key.supplied_secret(), None);
        key.secret_key = Some("***".into());
        assert_eq!(key.supplied_secret(), None);
    }
}
