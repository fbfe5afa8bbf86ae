//! Data Transfer Objects (DTOs) shared by several routes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================================================
// Collection DTOs
// ============================================================================

/// An unpaged list with its length.
#[derive(Debug, Serialize, Deserialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ItemsResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            total: items.len(),
            items,
        }
    }
}

/// Distinct attribute values for autocomplete.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FieldValuesResponse {
    pub values: Vec<String>,
}

// ============================================================================
// Health DTOs
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: DatabaseHealth,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<ComponentsHealth>,
}

/// Database health status.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DatabaseHealth {
    pub connected: bool,
    pub pool_size: u32,
    pub idle_connections: usize,
}

/// Component details for the detailed health check.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ComponentsHealth {
    /// Algorithm protecting secrets at rest.
    pub cipher: String,
    /// Whether secrets are actually encrypted.
    pub encryption_enabled: bool,
    /// Whether the upload directory exists and is a directory.
    pub upload_dir_ready: bool,
    /// Whether the Prometheus exporter is installed.
    pub metrics_enabled: bool,
}
