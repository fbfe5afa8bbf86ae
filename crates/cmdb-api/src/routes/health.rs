//! Health check endpoints.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::time::Instant;

use crate::dto::{ComponentsHealth, DatabaseHealth, HealthResponse};
use crate::state::AppState;

/// Start time for uptime calculation.
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time.
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Creates health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/detailed", get(health_check_detailed))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

/// Health check endpoint.
///
/// Returns overall system health status.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System is healthy", body = HealthResponse),
        (status = 503, description = "System is unhealthy", body = HealthResponse)
    ),
    tag = "Health"
)]
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_healthy = state.db.is_healthy().await;
    let (status, http_status) = overall_status(db_healthy);

    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: database_health(&state, db_healthy),
            uptime_seconds: uptime(),
            components: None,
        }),
    )
}

/// Detailed health check endpoint.
///
/// Adds cipher, upload directory and metrics exporter status.
#[utoipa::path(
    get,
    path = "/health/detailed",
    responses(
        (status = 200, description = "Detailed system health", body = HealthResponse),
        (status = 503, description = "System is unhealthy", body = HealthResponse)
    ),
    tag = "Health"
)]
async fn health_check_detailed(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let db_healthy = state.db.is_healthy().await;
    let (status, http_status) = overall_status(db_healthy);
    let cipher = state.cipher.algorithm();
    let upload_dir_ready = tokio::fs::metadata(state.upload_dir.as_path())
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);

    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: database_health(&state, db_healthy),
            uptime_seconds: uptime(),
            components: Some(ComponentsHealth {
                cipher: cipher.to_string(),
                encryption_enabled: cipher != "plaintext",
                upload_dir_ready,
                metrics_enabled: state.prometheus_handle.is_some(),
            }),
        }),
    )
}

fn overall_status(db_healthy: bool) -> (&'static str, StatusCode) {
    if db_healthy {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    }
}

fn database_health(state: &AppState, connected: bool) -> DatabaseHealth {
    DatabaseHealth {
        connected,
        pool_size: state.db.pool_size(),
        idle_connections: state.db.idle_connections(),
    }
}

fn uptime() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

/// Kubernetes readiness probe.
#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Service is ready"),
        (status = 503, description = "Service is not ready")
    ),
    tag = "Health"
)]
async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.db.is_healthy().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Kubernetes liveness probe.
#[utoipa::path(
    get,
    path = "/live",
    responses(
        (status = 200, description = "Service is alive")
    ),
    tag = "Health"
)]
async fn liveness_check() -> StatusCode {
    StatusCode::OK
}
