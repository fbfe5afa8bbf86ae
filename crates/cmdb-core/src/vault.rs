//! Credential vault.
//!
//! Every secret in the system (credential values, access-key secrets,
//! cloud account passwords, license codes, default passwords) is sealed
//! with the configured [`SecretCipher`] before it is written, and is only
//! opened again for callers holding [`Permission::RevealSecrets`]. Everyone
//! else sees [`SECRET_MASK`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::{AuthorizationContext, Permission};
use crate::crypto::SecretCipher;
use crate::db::{
    create_asset_repository, create_credential_repository, AssetRepository,
    CredentialRepository, DbPool, NewCredential,
};
use crate::error::{CmdbError, CmdbResult};
use crate::models::{Asset, AssetDetails, CloudAccount, Credential, CredentialInput};
use crate::validation::ValidationErrors;

/// Replacement shown to callers that may not see a secret.
pub const SECRET_MASK: &str = "***";

/// A submitted secret that carries no new value: blank, or the mask the
/// caller was shown on read.
pub fn is_unchanged_secret(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == SECRET_MASK
}

/// Seals secrets for storage and resolves them for a caller.
#[derive(Clone)]
pub struct SecretBox {
    cipher: Arc<dyn SecretCipher>,
}

impl SecretBox {
    pub fn new(cipher: Arc<dyn SecretCipher>) -> Self {
        Self { cipher }
    }

    pub fn seal(&self, plaintext: &str) -> CmdbResult<String> {
        Ok(self.cipher.encrypt(plaintext)?)
    }

    pub fn open(&self, ciphertext: &str) -> CmdbResult<String> {
        Ok(self.cipher.decrypt(ciphertext)?)
    }

    /// Plaintext for callers allowed to see secrets, the mask for the rest.
    pub fn resolve(&self, ctx: &AuthorizationContext, ciphertext: &str) -> CmdbResult<String> {
        if ctx.can_reveal_secrets() {
            self.open(ciphertext)
        } else {
            Ok(SECRET_MASK.to_string())
        }
    }

    /// Encrypts the secret attributes of asset details in place.
    pub fn seal_details(&self, details: &mut AssetDetails) -> CmdbResult<()> {
        details.map_secrets(|plain| self.seal(plain))
    }

    pub fn resolve_details(
        &self,
        ctx: &AuthorizationContext,
        details: &mut AssetDetails,
    ) -> CmdbResult<()> {
        details.map_secrets(|cipher| self.resolve(ctx, cipher))
    }

    pub fn resolve_credential(
        &self,
        ctx: &AuthorizationContext,
        mut credential: Credential,
    ) -> CmdbResult<Credential> {
        credential.value = self.resolve(ctx, &credential.value)?;
        Ok(credential)
    }

    /// Resolves the details and credentials of a stored asset.
    pub fn resolve_asset(&self, ctx: &AuthorizationContext, mut asset: Asset) -> CmdbResult<Asset> {
        self.resolve_details(ctx, &mut asset.details)?;
        asset.credentials = asset
            .credentials
            .into_iter()
            .map(|c| self.resolve_credential(ctx, c))
            .collect::<CmdbResult<_>>()?;
        Ok(asset)
    }

    /// Resolves the password and access-key secrets of a stored account.
    pub fn resolve_account(
        &self,
        ctx: &AuthorizationContext,
        mut account: CloudAccount,
    ) -> CmdbResult<CloudAccount> {
        if let Some(password) = account.password.as_deref().filter(|p| !p.is_empty()) {
            account.password = Some(self.resolve(ctx, password)?);
        }
        for key in &mut account.access_keys {
            key.secret_key = self.resolve(ctx, &key.secret_key)?;
        }
        Ok(account)
    }

    /// Validates and seals a list of credential inputs.
    ///
    /// `existing` holds the asset's stored credentials; an entry whose `id`
    /// names one of them may leave `value` blank to keep its ciphertext.
    pub fn seal_credentials(
        &self,
        inputs: &[CredentialInput],
        existing: &[Credential],
    ) -> CmdbResult<Vec<NewCredential>> {
        let mut errors = ValidationErrors::new();
        let mut sealed = Vec::with_capacity(inputs.len());

        for (i, input) in inputs.iter().enumerate() {
            let key = input.key.trim();
            if key.is_empty() {
                errors.add(format!("credentials[{}].key", i), "key is required");
            }

            let value_encrypted = if !is_unchanged_secret(&input.value) {
                self.seal(&input.value)?
            } else if let Some(previous) = input
                .id
                .and_then(|id| existing.iter().find(|c| c.id == id))
            {
                previous.value.clone()
            } else {
                errors.add(format!("credentials[{}].value", i), "value is required");
                continue;
            };

            sealed.push(NewCredential {
                credential_type: input.credential_type,
                key: key.to_string(),
                value_encrypted,
                description: crate::validation::normalize_optional(input.description.clone()),
            });
        }

        errors.into_result()?;
        Ok(sealed)
    }
}

/// Credential operations addressed by credential id.
pub struct CredentialVault {
    credentials: Box<dyn CredentialRepository>,
    assets: Box<dyn AssetRepository>,
    secrets: SecretBox,
}

impl CredentialVault {
    pub fn new(pool: &DbPool, cipher: Arc<dyn SecretCipher>) -> Self {
        Self {
            credentials: create_credential_repository(pool),
            assets: create_asset_repository(pool),
            secrets: SecretBox::new(cipher),
        }
    }

    /// Lists the credentials of an asset, values resolved for the caller.
    pub async fn list_for_asset(
        &self,
        ctx: &AuthorizationContext,
        asset_id: i64,
    ) -> CmdbResult<Vec<Credential>> {
        ctx.require(Permission::ViewAssets)?;
        if !self.assets.exists(asset_id).await? {
            return Err(CmdbError::not_found("Asset", asset_id));
        }

        debug!(asset_id, "Listing credentials");
        self.credentials
            .list_for_asset(asset_id)
            .await?
            .into_iter()
            .map(|c| self.secrets.resolve_credential(ctx, c))
            .collect()
    }

    /// Adds a credential to an asset.
    pub async fn create(
        &self,
        ctx: &AuthorizationContext,
        asset_id: i64,
        input: &CredentialInput,
    ) -> CmdbResult<Credential> {
        ctx.require(Permission::ManageAssets)?;
        if !self.assets.exists(asset_id).await? {
            return Err(CmdbError::not_found("Asset", asset_id));
        }

        let mut sealed = self
            .secrets
            .seal_credentials(std::slice::from_ref(input), &[])?;
        let record = sealed.remove(0);

        let created = self.credentials.create(asset_id, &record).await?;
        info!(
            credential_id = created.id,
            asset_id,
            actor = %ctx.actor_name,
            "Credential created"
        );
        self.secrets.resolve_credential(ctx, created)
    }

    /// Returns a credential with its value decrypted. Admin only.
    pub async fn reveal(&self, ctx: &AuthorizationContext, id: i64) -> CmdbResult<Credential> {
        ctx.require(Permission::RevealSecrets)?;

        let credential = self
            .credentials
            .get(id)
            .await?
            .ok_or_else(|| CmdbError::not_found("Credential", id))?;

        let revealed = Credential {
            value: self.secrets.open(&credential.value)?,
            ..credential
        };

        metrics::counter!("cmdb_secret_reveals_total").increment(1);
        info!(credential_id = id, actor = %ctx.actor_name, "Credential revealed");
        Ok(revealed)
    }

    /// Deletes a credential. Admin only.
    pub async fn delete(&self, ctx: &AuthorizationContext, id: i64) -> CmdbResult<()> {
        ctx.require(Permission::RevealSecrets)?;

        if !self.credentials.delete(id).await? {
            return Err(CmdbError::not_found("Credential", id));
        }
        info!(credential_id = id, actor = %ctx.actor_name, "Credential deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, User};
    use crate::crypto::AesGcmCipher;
    use crate::db::{create_in_memory_pool, AssetRecord};
    use crate::models::{CredentialKind, ServerDetails};

    fn cipher() -> Arc<dyn SecretCipher> {
        Arc::new(AesGcmCipher::new([3u8; 32]))
    }

    fn user_ctx() -> AuthorizationContext {
        AuthorizationContext::from_user(&User::new("viewer", None, None, Role::User))
    }

    async fn setup() -> (DbPool, CredentialVault, i64) {
        let pool = create_in_memory_pool().await.unwrap();
        let vault = CredentialVault::new(&pool, cipher());
        let asset = create_asset_repository(&pool)
            .create(&AssetRecord {
                name: "web-1".into(),
                description: None,
                created_by: None,
                details: AssetDetails::Server(ServerDetails::default()),
                tag_ids: None,
                credentials: None,
            })
            .await
            .unwrap();
        (pool, vault, asset.id)
    }

    #[test]
    fn test_seal_credentials_keeps_blank_existing() {
        let secrets = SecretBox::new(cipher());
        let existing = Credential {
            id: 7,
            asset_id: 1,
            credential_type: CredentialKind::Password,
            key: "root".into(),
            value: "old-cipher".into(),
            description: None,
            created_at: chrono::Utc::now(),
        };

        let mut keep = CredentialInput::new(CredentialKind::Password, "root", "");
        keep.id = Some(7);
        let fresh = CredentialInput::new(CredentialKind::SshKey, "deploy", "KEY");

        let sealed = secrets
            .seal_credentials(&[keep, fresh], std::slice::from_ref(&existing))
            .unwrap();
        assert_eq!(sealed[0].value_encrypted, "old-cipher");
        assert_eq!(secrets.open(&sealed[1].value_encrypted).unwrap(), "KEY");
    }

    #[test]
    fn test_seal_credentials_rejects_blank_new_value() {
        let secrets = SecretBox::new(cipher());
        let mut unknown = CredentialInput::new(CredentialKind::Password, "root", " ");
        unknown.id = Some(99);

        let err = secrets.seal_credentials(&[unknown], &[]).unwrap_err();
        match err {
            CmdbError::Validation(errors) => {
                assert!(errors.message_for("credentials[0].value").is_some())
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_admin_sees_mask() {
        let (_pool, vault, asset_id) = setup().await;
        let admin = AuthorizationContext::system();

        let created = vault
            .create(
                &admin,
                asset_id,
                &CredentialInput::new(CredentialKind::Password, "root", "hunter2"),
            )
            .await
            .unwrap();
        assert_eq!(created.value, "hunter2");

        let listed = vault.list_for_asset(&user_ctx(), asset_id).await.unwrap();
        assert_eq!(listed[0].value, SECRET_MASK);

        let listed = vault.list_for_asset(&admin, asset_id).await.unwrap();
        assert_eq!(listed[0].value, "hunter2");
    }

    #[tokio::test]
    async fn test_reveal_and_delete_require_admin() {
        let (_pool, vault, asset_id) = setup().await;
        let admin = AuthorizationContext::system();
        let created = vault
            .create(
                &user_ctx(),
                asset_id,
                &CredentialInput::new(CredentialKind::Password, "root", "hunter2"),
            )
            .await
            .unwrap();
        assert_eq!(created.value, SECRET_MASK);

        assert!(matches!(
            vault.reveal(&user_ctx(), created.id).await,
            Err(CmdbError::Forbidden(_))
        ));
        assert_eq!(
            vault.reveal(&admin, created.id).await.unwrap().value,
            "hunter2"
        );

        assert!(matches!(
            vault.delete(&user_ctx(), created.id).await,
            Err(CmdbError::Forbidden(_))
        ));
        vault.delete(&admin, created.id).await.unwrap();
        assert!(matches!(
            vault.reveal(&admin, created.id).await,
            Err(CmdbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_and_unknown_asset() {
        let (_pool, vault, asset_id) = setup().await;
        let admin = AuthorizationContext::system();

        let err = vault
            .create(
                &admin,
                asset_id,
                &CredentialInput::new(CredentialKind::Password, "", "x"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CmdbError::Validation(_)));

        let err = vault
            .create(
                &admin,
                asset_id + 100,
                &CredentialInput::new(CredentialKind::Password, "root", "x"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CmdbError::NotFound { .. }));

        assert!(matches!(
            vault.list_for_asset(&admin, asset_id + 100).await,
            Err(CmdbError::NotFound { .. })
        ));
    }
}
