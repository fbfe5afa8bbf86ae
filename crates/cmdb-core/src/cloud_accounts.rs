//! Cloud account registry.

use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::{AuthorizationContext, Permission};
use crate::crypto::SecretCipher;
use crate::db::{
    create_cloud_account_repository, AccessKeyRecord, CloudAccountRecord,
    CloudAccountRepository, DbPool,
};
use crate::error::{CmdbError, CmdbResult};
use crate::models::{AccessKey, AccessKeyInput, CloudAccount, CloudAccountInput};
use crate::validation::{normalize_optional, ValidationErrors};
use crate::vault::{is_unchanged_secret, SecretBox};

/// Cloud provider accounts with their access keys.
pub struct CloudAccountRegistry {
    accounts: Box<dyn CloudAccountRepository>,
    secrets: SecretBox,
}

impl CloudAccountRegistry {
    pub fn new(pool: &DbPool, cipher: Arc<dyn SecretCipher>) -> Self {
        Self {
            accounts: create_cloud_account_repository(pool),
            secrets: SecretBox::new(cipher),
        }
    }

    pub async fn list(
        &self,
        ctx: &AuthorizationContext,
        cloud_provider: Option<&str>,
    ) -> CmdbResult<Vec<CloudAccount>> {
        ctx.require(Permission::ViewAssets)?;
        debug!(?cloud_provider, "Listing cloud accounts");
        self.accounts
            .list(cloud_provider)
            .await?
            .into_iter()
            .map(|account| self.secrets.resolve_account(ctx, account))
            .collect()
    }

    pub async fn get(&self, ctx: &AuthorizationContext, id: i64) -> CmdbResult<CloudAccount> {
        ctx.require(Permission::ViewAssets)?;
        let account = self.load(id).await?;
        self.secrets.resolve_account(ctx, account)
    }

    pub async fn create(
        &self,
        ctx: &AuthorizationContext,
        input: &CloudAccountInput,
    ) -> CmdbResult<CloudAccount> {
        ctx.require(Permission::ManageAssets)?;
        let input = normalize_input(input);
        input.validate().into_result()?;
        self.check_natural_key(&input, None).await?;

        let record = CloudAccountRecord {
            cloud_provider: input.cloud_provider.clone(),
            account_name: input.account_name.clone(),
            password_encrypted: self.seal_password(input.password.as_deref())?,
            phone: input.phone.clone(),
            balance: input.balance,
            notes: input.notes.clone(),
            access_keys: match &input.access_keys {
                Some(keys) => Some(self.seal_access_keys(keys, &[], true)?),
                None => None,
            },
        };

        let account = self.accounts.create(&record).await?;
        info!(
            account_id = account.id,
            provider = %account.cloud_provider,
            actor = %ctx.actor_name,
            "Cloud account created"
        );
        self.secrets.resolve_account(ctx, account)
    }

    /// Updates an account. A blank password keeps the stored one; keys are
    /// replaced only when `access_keys` is present.
    pub async fn update(
        &self,
        ctx: &AuthorizationContext,
        id: i64,
        input: &CloudAccountInput,
    ) -> CmdbResult<CloudAccount> {
        ctx.require(Permission::ManageAssets)?;
        let current = self.load(id).await?;
        let input = normalize_input(input);
        input.validate().into_result()?;
        self.check_natural_key(&input, Some(id)).await?;

        let password_encrypted = match self.seal_password(input.password.as_deref())? {
            Some(sealed) => Some(sealed),
            None => current.password.clone(),
        };

        let record = CloudAccountRecord {
            cloud_provider: input.cloud_provider.clone(),
            account_name: input.account_name.clone(),
            password_encrypted,
            phone: input.phone.clone(),
            balance: input.balance,
            notes: input.notes.clone(),
            access_keys: match &input.access_keys {
                Some(keys) => Some(self.seal_access_keys(keys, &current.access_keys, true)?),
                None => None,
            },
        };

        let account = self.accounts.update(id, &record).await?;
        info!(account_id = id, actor = %ctx.actor_name, "Cloud account updated");
        self.secrets.resolve_account(ctx, account)
    }

    /// Deletes an account with its keys; cloud assets referencing it lose
    /// the reference.
    pub async fn delete(&self, ctx: &AuthorizationContext, id: i64) -> CmdbResult<()> {
        ctx.require(Permission::ManageAssets)?;
        if !self.accounts.delete(id).await? {
            return Err(CmdbError::not_found("CloudAccount", id));
        }
        info!(account_id = id, actor = %ctx.actor_name, "Cloud account deleted");
        Ok(())
    }

    pub async fn add_access_key(
        &self,
        ctx: &AuthorizationContext,
        account_id: i64,
        input: &AccessKeyInput,
    ) -> CmdbResult<AccessKey> {
        ctx.require(Permission::ManageAssets)?;
        if !self.accounts.exists(account_id).await? {
            return Err(CmdbError::not_found("CloudAccount", account_id));
        }

        let mut records = self.seal_access_keys(std::slice::from_ref(input), &[], false)?;
        let record = records.remove(0);
        let key = self.accounts.add_access_key(account_id, &record).await?;
        info!(account_id, key_id = key.id, "Access key added");
        self.resolve_key(ctx, key)
    }

    /// Updates a key of an account. A blank secret keeps the stored one.
    pub async fn update_access_key(
        &self,
        ctx: &AuthorizationContext,
        account_id: i64,
        key_id: i64,
        input: &AccessKeyInput,
    ) -> CmdbResult<AccessKey> {
        ctx.require(Permission::ManageAssets)?;
        let current = self
            .accounts
            .get_access_key(account_id, key_id)
            .await?
            .ok_or_else(|| CmdbError::not_found("AccessKey", key_id))?;

        let input = AccessKeyInput {
            id: Some(key_id),
            ..input.clone()
        };
        let mut records = self.seal_access_keys(std::slice::from_ref(&input), &[current], false)?;
        let record = records.remove(0);
        let key = self
            .accounts
            .update_access_key(account_id, key_id, &record)
            .await?;
        info!(account_id, key_id, "Access key updated");
        self.resolve_key(ctx, key)
    }

    pub async fn delete_access_key(
        &self,
        ctx: &AuthorizationContext,
        account_id: i64,
        key_id: i64,
    ) -> CmdbResult<()> {
        ctx.require(Permission::ManageAssets)?;
        if !self.accounts.delete_access_key(account_id, key_id).await? {
            return Err(CmdbError::not_found("AccessKey", key_id));
        }
        info!(account_id, key_id, "Access key deleted");
        Ok(())
    }

    async fn load(&self, id: i64) -> CmdbResult<CloudAccount> {
        self.accounts
            .get(id)
            .await?
            .ok_or_else(|| CmdbError::not_found("CloudAccount", id))
    }

    async fn check_natural_key(
        &self,
        input: &CloudAccountInput,
        current_id: Option<i64>,
    ) -> CmdbResult<()> {
        let existing = self
            .accounts
            .find_by_natural_key(&input.cloud_provider, &input.account_name)
            .await?;
        match existing {
            Some(other) if Some(other.id) != current_id => Err(CmdbError::Conflict(format!(
                "Cloud account {}/{} already exists",
                input.cloud_provider, input.account_name
            ))),
            _ => Ok(()),
        }
    }

    fn seal_password(&self, password: Option<&str>) -> CmdbResult<Option<String>> {
        match password.filter(|p| !is_unchanged_secret(p)) {
            Some(plain) => Ok(Some(self.secrets.seal(plain)?)),
            None => Ok(None),
        }
    }

    /// Seals access-key inputs. A key may omit its secret only when its `id`
    /// names one of `existing`. `nested` prefixes error fields with
    /// `access_keys[i].`.
    fn seal_access_keys(
        &self,
        inputs: &[AccessKeyInput],
        existing: &[AccessKey],
        nested: bool,
    ) -> CmdbResult<Vec<AccessKeyRecord>> {
        let mut errors = ValidationErrors::new();
        let mut records = Vec::with_capacity(inputs.len());

        for (i, input) in inputs.iter().enumerate() {
            let access_key = input.access_key.trim();
            if access_key.is_empty() {
                errors.add(field(nested, i, "access_key"), "access_key is required");
            }

            let secret_key_encrypted = match input.supplied_secret() {
                Some(secret) => self.secrets.seal(secret)?,
                None => {
                    match input.id.and_then(|id| existing.iter().find(|k| k.id == id)) {
                        Some(key) => key.secret_key.clone(),
                        None => {
                            errors.add(
                                field(nested, i, "secret_key"),
                                "secret_key is required",
                            );
                            continue;
                        }
                    }
                }
            };

            records.push(AccessKeyRecord {
                access_key: access_key.to_string(),
                secret_key_encrypted,
                assigned_to: normalize_optional(input.assigned_to.clone()),
                description: normalize_optional(input.description.clone()),
            });
        }

        errors.into_result()?;
        Ok(records)
    }

    fn resolve_key(&self, ctx: &AuthorizationContext, mut key: AccessKey) -> CmdbResult<AccessKey> {
        key.secret_key = self.secrets.resolve(ctx, &key.secret_key)?;
        Ok(key)
    }
}

fn field(nested: bool, index: usize, name: &str) -> String {
    if nested {
        format!("access_keys[{}].{}", index, name)
    } else {
        name.to_string()
    }
}

fn normalize_input(input: &CloudAccountInput) -> CloudAccountInput {
    CloudAccountInput {
        cloud_provider: input.cloud_provider.trim().to_string(),
        account_name: input.account_name.trim().to_string(),
        password: input.password.clone(),
        phone: normalize_optional(input.phone.clone()),
        balance: input.balance,
        notes: normalize_optional(input.notes.clone()),
        access_keys: input.access_keys.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, User};
    use crate::crypto::{AesGcmCipher, SecretCipher};
    use crate::db::create_in_memory_pool;
    use crate::vault::SECRET_MASK;

    async fn setup() -> (DbPool, CloudAccountRegistry) {
        let pool = create_in_memory_pool().await.unwrap();
        let cipher: Arc<dyn SecretCipher> = Arc::new(AesGcmCipher::new([3u8; 32]));
        let registry = CloudAccountRegistry::new(&pool, cipher);
        (pool, registry)
    }

    fn account_input() -> CloudAccountInput {
        let mut input = CloudAccountInput::new("aliyun", "main");
        input.password = Some("hunter2".into());
        input.access_keys = Some(vec![AccessKeyInput::new("AK1", "SK1")]);
        input
    }

    fn viewer() -> AuthorizationContext {
        AuthorizationContext::from_user(&User::new("viewer", None, None, Role::User))
    }

    #[tokio::test]
    async fn test_create_and_reveal() {
        let (_pool, registry) = setup().await;
        let admin = AuthorizationContext::system();

        let account = registry.create(&admin, &account_input()).await.unwrap();
        assert_eq!(account.password.as_deref(), Some("hunter2"));
        assert_eq!(account.access_keys[0].secret_key, "SK1");

        let masked = registry.get(&viewer(), account.id).await.unwrap();
        assert_eq!(masked.password.as_deref(), Some(SECRET_MASK));
        assert_eq!(masked.access_keys[0].secret_key, SECRET_MASK);
        assert_eq!(masked.access_keys[0].access_key, "AK1");
    }

    #[tokio::test]
    async fn test_duplicate_natural_key() {
        let (_pool, registry) = setup().await;
        let admin = AuthorizationContext::system();
        registry.create(&admin, &account_input()).await.unwrap();

        let err = registry
            .create(&admin, &CloudAccountInput::new(" aliyun", "main "))
            .await
            .unwrap_err();
        assert!(matches!(err, CmdbError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_keeps_blank_secrets() {
        let (_pool, registry) = setup().await;
        let admin = AuthorizationContext::system();
        let account = registry.create(&admin, &account_input()).await.unwrap();
        let key_id = account.access_keys[0].id;

        let mut input = CloudAccountInput::new("aliyun", "main");
        input.password = Some(String::new());
        input.access_keys = Some(vec![AccessKeyInput {
            id: Some(key_id),
            access_key: "AK1".into(),
            secret_key: None,
            assigned_to: Some("alice".into()),
            description: None,
        }]);

        let updated = registry.update(&admin, account.id, &input).await.unwrap();
        assert_eq!(updated.password.as_deref(), Some("hunter2"));
        assert_eq!(updated.access_keys[0].secret_key, "SK1");
        assert_eq!(updated.access_keys[0].assigned_to.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_member_round_trip_keeps_masked_secrets() {
        let (_pool, registry) = setup().await;
        let admin = AuthorizationContext::system();
        let account = registry.create(&admin, &account_input()).await.unwrap();

        let seen = registry.get(&viewer(), account.id).await.unwrap();
        let input = CloudAccountInput {
            cloud_provider: seen.cloud_provider.clone(),
            account_name: seen.account_name.clone(),
            password: seen.password.clone(),
            phone: seen.phone.clone(),
            balance: seen.balance,
            notes: Some("edited".into()),
            access_keys: Some(
                seen.access_keys
                    .iter()
                    .map(|k| AccessKeyInput {
                        id: Some(k.id),
                        access_key: k.access_key.clone(),
                        secret_key: Some(k.secret_key.clone()),
                        assigned_to: k.assigned_to.clone(),
                        description: k.description.clone(),
                    })
                    .collect(),
            ),
        };
        registry.update(&viewer(), account.id, &input).await.unwrap();

        let key_id = seen.access_keys[0].id;
        registry
            .update_access_key(
                &viewer(),
                account.id,
                key_id,
                &AccessKeyInput::new("AK1", SECRET_MASK),
            )
            .await
            .unwrap();

        let stored = registry.get(&admin, account.id).await.unwrap();
        assert_eq!(stored.password.as_deref(), Some("hunter2"));
        assert_eq!(stored.access_keys[0].secret_key, "SK1");
        assert_eq!(stored.notes.as_deref(), Some("edited"));
    }

    #[tokio::test]
    async fn test_new_key_requires_secret() {
        let (_pool, registry) = setup().await;
        let admin = AuthorizationContext::system();
        let mut input = CloudAccountInput::new("aws", "prod");
        input.access_keys = Some(vec![AccessKeyInput {
            access_key: "AK".into(),
            ..Default::default()
        }]);

        match registry.create(&admin, &input).await {
            Err(CmdbError::Validation(errors)) => {
                assert!(errors.message_for("access_keys[0].secret_key").is_some());
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_access_key_lifecycle() {
        let (_pool, registry) = setup().await;
        let admin = AuthorizationContext::system();
        let account = registry
            .create(&admin, &CloudAccountInput::new("tencent", "ops"))
            .await
            .unwrap();

        let key = registry
            .add_access_key(&admin, account.id, &AccessKeyInput::new("AK2", "SK2"))
            .await
            .unwrap();
        let updated = registry
            .update_access_key(
                &admin,
                account.id,
                key.id,
                &AccessKeyInput {
                    access_key: "AK2-renamed".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.access_key, "AK2-renamed");
        assert_eq!(updated.secret_key, "SK2");

        assert!(matches!(
            registry.delete_access_key(&admin, account.id + 1, key.id).await,
            Err(CmdbError::NotFound { .. })
        ));
        registry
            .delete_access_key(&admin, account.id, key.id)
            .await
            .unwrap();

        assert!(matches!(
            registry
                .add_access_key(&admin, 999, &AccessKeyInput::new("a", "b"))
                .await,
            Err(CmdbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let (_pool, registry) = setup().await;
        assert!(matches!(
            registry.delete(&AuthorizationContext::system(), 7).await,
            Err(CmdbError::NotFound { .. })
        ));
    }
}
