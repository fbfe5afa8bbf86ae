//! Database schema and migrations.

use super::{DbError, DbPool};
use tracing::info;

/// Runs the embedded SQLite migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("Running SQLite migrations");
    sqlx::migrate!("src/db/migrations/sqlite")
        .run(pool.sqlite())
        .await?;

    info!("Migrations completed successfully");
    Ok(())
}
