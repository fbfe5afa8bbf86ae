use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    EntityKind, IdRemap, ImportCounts, ImportRecordError, ImportResult, MigrationEngine, Snapshot,
    SnapshotAsset, SnapshotCloudAccount, SnapshotCredential, SnapshotUser,
};
use crate::auth::{AuthorizationContext, Role, User};
use crate::db::{AccessKeyRecord, AssetRecord, CloudAccountRecord, NewCredential};
use crate::error::CmdbError;
use crate::models::{AssetDetails, Tag, TagInput};

/// Decodes one snapshot record.
fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, CmdbError> {
    T::deserialize(value)
        .map_err(|e| CmdbError::invalid("record", format!("malformed record: {}", e)))
}

/// `id <n>` from a record that may not have decoded.
fn source_reference(value: &Value) -> String {
    match value.get("id") {
        Some(id) => format!("id {}", id),
        None => "id unknown".to_string(),
    }
}

/// Outcome of one record.
enum Outcome {
    Imported,
    Skipped,
}

struct Run<'a> {
    engine: &'a MigrationEngine,
    remap: IdRemap,
    imported: ImportCounts,
    skipped: ImportCounts,
    errors: Vec<ImportRecordError>,
}

impl Run<'_> {
    fn record(&mut self, kind: EntityKind, reference: String, result: Result<Outcome, CmdbError>) {
        let outcome = match result {
            Ok(Outcome::Imported) => {
                self.imported.bump(kind);
                "imported"
            }
            Ok(Outcome::Skipped) => {
                debug!(entity = %kind, %reference, "Record exists, skipped");
                self.skipped.bump(kind);
                "skipped"
            }
            Err(err) => {
                let reason = match &err {
                    CmdbError::Validation(errors) => errors.summary(),
                    other => other.to_string(),
                };
                warn!(entity = %kind, %reference, %reason, "Import record failed");
                self.errors.push(ImportRecordError {
                    entity: kind,
                    reference,
                    reason,
                });
                "failed"
            }
        };
        metrics::counter!(
            "cmdb_import_records_total",
            "entity" => kind.as_str(),
            "outcome" => outcome
        )
        .increment(1);
    }

    async fn import_tag(&mut self, tag: &Tag) -> Result<Outcome, CmdbError> {
        let input = TagInput::new(&tag.key, &tag.value).normalized()?;
        if let Some(existing) = self
            .engine
            .tags
            .find_by_pair(&input.key, &input.value)
            .await?
        {
            self.remap.insert(EntityKind::Tag, tag.id, existing.id);
            return Ok(Outcome::Skipped);
        }

        let created = self.engine.tags.create(&input).await?;
        self.remap.insert(EntityKind::Tag, tag.id, created.id);
        Ok(Outcome::Imported)
    }

    async fn import_user(&mut self, user: &SnapshotUser) -> Result<Outcome, CmdbError> {
        let username = user.username.trim();
        if username.is_empty() {
            return Err(CmdbError::invalid("username", "username is required"));
        }
        if let Some(existing) = self.engine.users.get_by_username(username).await? {
            self.remap.insert(EntityKind::User, user.id, existing.id);
            return Ok(Outcome::Skipped);
        }

        let mut new_user = User::new(
            username,
            user.email.clone(),
            None,
            Role::from_admin_flag(user.is_admin),
        );
        new_user.is_active = user.is_active;
        let created = self.engine.users.create(&new_user).await?;
        self.remap.insert(EntityKind::User, user.id, created.id);
        Ok(Outcome::Imported)
    }

    async fn import_account(&mut self, account: &SnapshotCloudAccount) -> Result<Outcome, CmdbError> {
        let provider = account.cloud_provider.trim();
        let name = account.account_name.trim();
        if let Some(existing) = self
            .engine
            .accounts
            .find_by_natural_key(provider, name)
            .await?
        {
            self.remap.insert(EntityKind::CloudAccount, account.id, existing.id);
            return Ok(Outcome::Skipped);
        }

        let record = CloudAccountRecord {
            cloud_provider: provider.to_string(),
            account_name: name.to_string(),
            password_encrypted: account.password.clone(),
            phone: account.phone.clone(),
            balance: account.balance,
            notes: account.notes.clone(),
            access_keys: Some(
                account
                    .access_keys
                    .iter()
                    .map(|k| AccessKeyRecord {
                        access_key: k.access_key.clone(),
                        secret_key_encrypted: k.secret_key.clone(),
                        assigned_to: k.assigned_to.clone(),
                        description: k.description.clone(),
                    })
                    .collect(),
            ),
        };
        if let Some(balance) = record.balance {
            if balance < 0.0 {
                return Err(CmdbError::invalid("balance", "balance must be >= 0"));
            }
        }

        let created = self.engine.accounts.create(&record).await?;
        self.remap
            .insert(EntityKind::CloudAccount, account.id, created.id);
        for (source, destination) in account.access_keys.iter().zip(&created.access_keys) {
            self.remap
                .insert(EntityKind::AccessKey, source.id, destination.id);
        }
        Ok(Outcome::Imported)
    }

    /// Creates the asset and its credentials in one transaction. Returns the
    /// number of credentials written.
    async fn import_asset(
        &mut self,
        asset: &SnapshotAsset,
        credentials: &[&SnapshotCredential],
    ) -> Result<usize, CmdbError> {
        let mut dropped = Vec::new();
        let mut details = asset.details.clone();
        if let AssetDetails::Cloud(cloud) = &mut details {
            if let Some(source) = cloud.cloud_account_id {
                cloud.cloud_account_id = self.remap.get(EntityKind::CloudAccount, source);
                if cloud.cloud_account_id.is_none() {
                    dropped.push(format!("cloud account {}", source));
                }
            }
        }
        details.validate().into_result()?;

        let name = asset.name.trim();
        if name.is_empty() {
            return Err(CmdbError::invalid("name", "name is required"));
        }

        let mut new_credentials = Vec::with_capacity(credentials.len());
        for credential in credentials {
            if credential.key.trim().is_empty() || credential.value.is_empty() {
                return Err(CmdbError::invalid(
                    "credentials",
                    format!("credential {} has an empty key or value", credential.id),
                ));
            }
            new_credentials.push(NewCredential {
                credential_type: credential.credential_type,
                key: credential.key.trim().to_string(),
                value_encrypted: credential.value.clone(),
                description: credential.description.clone(),
            });
        }

        let created_by = match asset.created_by {
            Some(source) => {
                let mapped = self.remap.get(EntityKind::User, source);
                if mapped.is_none() {
                    dropped.push(format!("user {}", source));
                }
                mapped
            }
            None => None,
        };

        let mut tag_ids = Vec::with_capacity(asset.tag_ids.len());
        for source in &asset.tag_ids {
            match self.remap.get(EntityKind::Tag, *source) {
                Some(id) => tag_ids.push(id),
                None => dropped.push(format!("tag {}", source)),
            }
        }

        let record = AssetRecord {
            name: name.to_string(),
            description: asset.description.clone(),
            created_by,
            details,
            tag_ids: Some(tag_ids),
            credentials: Some(new_credentials),
        };

        let created = self.engine.assets.create(&record).await?;
        self.remap.insert(EntityKind::Asset, asset.id, created.id);
        for (source, destination) in credentials.iter().zip(&created.credentials) {
            self.remap
                .insert(EntityKind::Credential, source.id, destination.id);
        }

        for target in dropped {
            let reference = format!("{} (id {})", asset.name, asset.id);
            let reason = format!("{} was not imported, reference dropped", target);
            warn!(entity = %EntityKind::Asset, %reference, %reason, "Import reference dropped");
            self.errors.push(ImportRecordError {
                entity: EntityKind::Asset,
                reference,
                reason,
            });
        }
        Ok(created.credentials.len())
    }
}

pub(super) async fn run(
    engine: &MigrationEngine,
    ctx: &AuthorizationContext,
    snapshot: &Snapshot,
) -> ImportResult {
    let data = &snapshot.data;
    let mut run = Run {
        engine,
        remap: IdRemap::new(),
        imported: ImportCounts::default(),
        skipped: ImportCounts::default(),
        errors: Vec::new(),
    };

    info!(
        version = %snapshot.version,
        export_time = %snapshot.export_time,
        actor = %ctx.actor_name,
        "Importing snapshot"
    );

    for value in &data.tags {
        let tag = match decode::<Tag>(value) {
            Ok(tag) => tag,
            Err(err) => {
                run.record(EntityKind::Tag, source_reference(value), Err(err));
                continue;
            }
        };
        let result = run.import_tag(&tag).await;
        run.record(EntityKind::Tag, tag.label(), result);
    }

    for value in &data.users {
        let user = match decode::<SnapshotUser>(value) {
            Ok(user) => user,
            Err(err) => {
                run.record(EntityKind::User, source_reference(value), Err(err));
                continue;
            }
        };
        let result = run.import_user(&user).await;
        run.record(EntityKind::User, user.username.clone(), result);
    }

    for value in &data.cloud_accounts {
        let account = match decode::<SnapshotCloudAccount>(value) {
            Ok(account) => account,
            Err(err) => {
                run.record(EntityKind::CloudAccount, source_reference(value), Err(err));
                continue;
            }
        };
        let result = run.import_account(&account).await;
        let reference = format!("{}/{}", account.cloud_provider, account.account_name);
        run.record(EntityKind::CloudAccount, reference, result);
    }

    let mut credentials = Vec::with_capacity(data.credentials.len());
    for value in &data.credentials {
        match decode::<SnapshotCredential>(value) {
            Ok(credential) => credentials.push(credential),
            Err(err) => run.record(EntityKind::Credential, source_reference(value), Err(err)),
        }
    }
    let mut by_asset: HashMap<i64, Vec<&SnapshotCredential>> = HashMap::new();
    for credential in &credentials {
        by_asset.entry(credential.asset_id).or_default().push(credential);
    }

    for value in &data.assets {
        let asset = match decode::<SnapshotAsset>(value) {
            Ok(asset) => asset,
            Err(err) => {
                if let Some(id) = value.get("id").and_then(Value::as_i64) {
                    by_asset.remove(&id);
                }
                run.record(EntityKind::Asset, source_reference(value), Err(err));
                continue;
            }
        };
        let credentials = by_asset.remove(&asset.id).unwrap_or_default();
        let reference = format!("{} (id {})", asset.name, asset.id);
        match run.import_asset(&asset, &credentials).await {
            Ok(count) => {
                run.record(EntityKind::Asset, reference, Ok(Outcome::Imported));
                for _ in 0..count {
                    run.record(
                        EntityKind::Credential,
                        String::new(),
                        Ok(Outcome::Imported),
                    );
                }
            }
            Err(err) => run.record(EntityKind::Asset, reference, Err(err)),
        }
    }

    let mut orphans: Vec<&SnapshotCredential> = by_asset.into_values().flatten().collect();
    orphans.sort_by_key(|c| c.id);
    for credential in orphans {
        run.record(
            EntityKind::Credential,
            format!("id {}", credential.id),
            Err(CmdbError::invalid(
                "asset_id",
                format!("asset {} is not in the snapshot", credential.asset_id),
            )),
        );
    }

    let message = format!(
        "Import completed: {} imported, {} skipped, {} failed",
        run.imported.total(),
        run.skipped.total(),
        run.errors.len()
    );
    info!(
        imported = run.imported.total(),
        skipped = run.skipped.total(),
        failed = run.errors.len(),
        remapped = run.remap.len(),
        "Snapshot imported"
    );

    ImportResult {
        message,
        imported: run.imported,
        skipped: run.skipped,
        errors: run.errors,
    }
}
