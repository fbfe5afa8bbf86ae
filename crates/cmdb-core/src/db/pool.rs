//! Database connection pool management.

use super::DbError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Escapes special characters in a search pattern for use in SQL LIKE clauses.
///
/// - `%` -> `\%`
/// - `_` -> `\_`
/// - `\` -> `\\`
///
/// Queries using the result must declare `ESCAPE '\'`.
///
/// ```
/// use cmdb_core::db::escape_like_pattern;
///
/// assert_eq!(escape_like_pattern("web_01%"), r"web\_01\%");
/// ```
pub fn escape_like_pattern(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Creates a case-folded LIKE pattern that matches anywhere in the string.
///
/// ```
/// use cmdb_core::db::make_like_pattern;
///
/// assert_eq!(make_like_pattern("Web_01"), r"%web\_01%");
/// ```
pub fn make_like_pattern(search: &str) -> String {
    format!("%{}%", escape_like_pattern(&search.to_lowercase()))
}

/// Shared SQLite connection pool.
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: SqlitePool,
}

/// Options for creating a database connection pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Maximum time to wait for a connection.
    pub acquire_timeout: Duration,
    /// Maximum lifetime of a connection.
    pub max_lifetime: Option<Duration>,
    /// Idle timeout for connections.
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let min_connections = std::env::var("DATABASE_MIN_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        let acquire_timeout_secs = std::env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Self {
            max_connections,
            min_connections,
            acquire_timeout: Duration::from_secs(acquire_timeout_secs),
            max_lifetime: Some(Duration::from_secs(1800)),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl PoolOptions {
    /// A single long-lived connection, required for `sqlite::memory:` where
    /// every connection would otherwise see its own empty database.
    pub fn in_memory() -> Self {
        Self {
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: None,
            idle_timeout: None,
        }
    }
}

/// Creates a database connection pool from a `sqlite:` URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, DbError> {
    create_pool_with_options(database_url, PoolOptions::default()).await
}

/// Creates a database connection pool with custom options.
pub async fn create_pool_with_options(
    database_url: &str,
    options: PoolOptions,
) -> Result<DbPool, DbError> {
    if !database_url.starts_with("sqlite:") {
        return Err(DbError::Configuration(format!(
            "Unsupported database URL scheme. Expected sqlite:, got: {}",
            database_url.split(':').next().unwrap_or("unknown")
        )));
    }

    let mut connect_options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| DbError::Configuration(e.to_string()))?
        .create_if_missing(true)
        .foreign_keys(true);
    if !database_url.contains(":memory:") && !database_url.contains("mode=memory") {
        connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
    }

    info!(
        max_connections = options.max_connections,
        "Creating SQLite connection pool"
    );
    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .min_connections(options.min_connections)
        .acquire_timeout(options.acquire_timeout)
        .max_lifetime(options.max_lifetime)
        .idle_timeout(options.idle_timeout)
        .connect_with(connect_options)
        .await?;

    Ok(DbPool { pool })
}

/// Creates a migrated in-memory database, used by tests and dry runs.
pub async fn create_in_memory_pool() -> Result<DbPool, DbError> {
    let pool = create_pool_with_options("sqlite::memory:", PoolOptions::in_memory()).await?;
    super::run_migrations(&pool).await?;
    Ok(pool)
}

impl DbPool {
    /// Wraps an existing sqlx pool.
    pub fn from_sqlite(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the underlying sqlx pool.
    pub fn sqlite(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn db_type(&self) -> &'static str {
        "sqlite"
    }

    /// Checks if the database connection is healthy.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    pub async fn close(&self) {
        self.pool.close().await
    }

    pub fn pool_size(&self) -> u32 {
        self.pool.size()
    }

    pub fn idle_connections(&self) -> usize {
        self.pool.num_idle()
    }
}
