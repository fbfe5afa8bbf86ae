//! Application state shared across handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use cmdb_core::db::DbPool;
use cmdb_core::{
    AssetStore, CloudAccountRegistry, CredentialVault, MigrationEngine, SecretCipher, TagIndex,
};

/// Default directory for uploaded license files.
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DbPool>,
    /// Cipher protecting secrets at rest.
    pub cipher: Arc<dyn SecretCipher>,
    pub assets: Arc<AssetStore>,
    pub tags: Arc<TagIndex>,
    pub credentials: Arc<CredentialVault>,
    pub cloud_accounts: Arc<CloudAccountRegistry>,
    pub migration: Arc<MigrationEngine>,
    /// Root directory for uploaded files.
    pub upload_dir: Arc<PathBuf>,
    /// Prometheus metrics handle for rendering metrics.
    pub prometheus_handle: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(db: DbPool, cipher: Arc<dyn SecretCipher>) -> Self {
        info!(cipher = cipher.algorithm(), "Initializing CMDB stores");

        Self {
            assets: Arc::new(AssetStore::new(&db, cipher.clone())),
            tags: Arc::new(TagIndex::new(&db)),
            credentials: Arc::new(CredentialVault::new(&db, cipher.clone())),
            cloud_accounts: Arc::new(CloudAccountRegistry::new(&db, cipher.clone())),
            migration: Arc::new(MigrationEngine::new(&db)),
            db: Arc::new(db),
            cipher,
            upload_dir: Arc::new(PathBuf::from(DEFAULT_UPLOAD_DIR)),
            prometheus_handle: None,
        }
    }

    /// Sets the directory uploaded files are stored under.
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = Arc::new(dir.into());
        self
    }

    /// Creates a new application state with Prometheus handle.
    pub fn with_prometheus_handle(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus_handle = Some(Arc::new(handle));
        self
    }
}
