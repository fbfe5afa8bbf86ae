use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::{
    MigrationEngine, Snapshot, SnapshotAccessKey, SnapshotAsset, SnapshotCloudAccount,
    SnapshotCredential, SnapshotData, SnapshotUser, SNAPSHOT_VERSION,
};
use crate::auth::AuthorizationContext;
use crate::error::{CmdbError, CmdbResult};

fn section<T: Serialize>(records: Vec<T>) -> CmdbResult<Vec<Value>> {
    records
        .into_iter()
        .map(|record| {
            serde_json::to_value(record)
                .map_err(|e| CmdbError::invalid("data", format!("unserializable record: {}", e)))
        })
        .collect()
}

pub(super) async fn run(engine: &MigrationEngine, ctx: &AuthorizationContext) -> CmdbResult<Snapshot> {
    let users = engine
        .users
        .list()
        .await?
        .into_iter()
        .map(|u| SnapshotUser {
            id: u.id,
            is_admin: u.is_admin(),
            username: u.username,
            email: u.email,
            is_active: u.is_active,
            created_at: u.created_at,
        })
        .collect::<Vec<_>>();

    let tags = engine.tags.list(None, None).await?;

    let assets = engine
        .assets
        .list_all()
        .await?
        .into_iter()
        .map(|a| SnapshotAsset {
            id: a.id,
            name: a.name,
            description: a.description,
            created_by: a.created_by,
            created_at: a.created_at,
            updated_at: a.updated_at,
            details: a.details,
            tag_ids: a.tags.iter().map(|t| t.id).collect(),
        })
        .collect::<Vec<_>>();

    let credentials = engine
        .credentials
        .list_all()
        .await?
        .into_iter()
        .map(|c| SnapshotCredential {
            id: c.id,
            asset_id: c.asset_id,
            credential_type: c.credential_type,
            key: c.key,
            value: c.value,
            description: c.description,
            created_at: c.created_at,
        })
        .collect::<Vec<_>>();

    let mut accounts = engine.accounts.list(None).await?;
    accounts.sort_by_key(|a| a.id);
    let cloud_accounts = accounts
        .into_iter()
        .map(|a| SnapshotCloudAccount {
            id: a.id,
            cloud_provider: a.cloud_provider,
            account_name: a.account_name,
            password: a.password,
            phone: a.phone,
            balance: a.balance,
            notes: a.notes,
            created_at: a.created_at,
            access_keys: a
                .access_keys
                .into_iter()
                .map(|k| SnapshotAccessKey {
                    id: k.id,
                    access_key: k.access_key,
                    secret_key: k.secret_key,
                    assigned_to: k.assigned_to,
                    description: k.description,
                    created_at: k.created_at,
                })
                .collect(),
        })
        .collect::<Vec<_>>();

    info!(
        users = users.len(),
        tags = tags.len(),
        assets = assets.len(),
        credentials = credentials.len(),
        cloud_accounts = cloud_accounts.len(),
        actor = %ctx.actor_name,
        "Database exported"
    );

    Ok(Snapshot {
        version: SNAPSHOT_VERSION.to_string(),
        export_time: Utc::now(),
        data: SnapshotData {
            users: section(users)?,
            tags: section(tags)?,
            assets: section(assets)?,
            credentials: section(credentials)?,
            cloud_accounts: section(cloud_accounts)?,
        },
    })
}
