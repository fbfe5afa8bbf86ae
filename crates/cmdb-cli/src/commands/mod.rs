//! CLI command implementations.

mod admin;
mod data;
mod serve;

pub use admin::{create_api_key, create_user, generate_key};
pub use data::{export_snapshot, import_snapshot};
pub use serve::{run_server, ServeConfig};

use anyhow::{Context, Result};

use cmdb_core::db::{create_pool_with_options, run_migrations, DbPool, PoolOptions};

use crate::config::AppConfig;

/// Opens the configured database and applies pending migrations.
pub(crate) async fn open_database(database_url: &str, config: &AppConfig) -> Result<DbPool> {
    let mut options = PoolOptions::default();
    if let Some(max) = config.database.max_connections {
        options.max_connections = max;
    }

    let pool = create_pool_with_options(database_url, options)
        .await
        .context("Failed to create database connection pool")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(pool)
}
