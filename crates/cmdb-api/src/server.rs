//! API server implementation.

use axum::{middleware, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::dto::{ComponentsHealth, DatabaseHealth, FieldValuesResponse, HealthResponse};
use crate::error::ErrorResponse;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::routes;
use crate::routes::tags::TagIdsRequest;
use crate::state::AppState;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to bind to.
    pub bind_address: SocketAddr,
    /// Request timeout.
    pub request_timeout: Duration,
    /// Enable Swagger UI.
    pub enable_swagger: bool,
    /// Origins allowed by CORS; empty allows any.
    pub cors_origins: Vec<String>,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8000)),
            request_timeout: Duration::from_secs(60),
            enable_swagger: true,
            cors_origins: Vec::new(),
        }
    }
}

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::health::health_check_detailed,
        crate::routes::health::readiness_check,
        crate::routes::health::liveness_check,
        crate::routes::metrics::prometheus_metrics,
        crate::routes::assets::list_assets,
        crate::routes::assets::create_asset,
        crate::routes::assets::get_asset,
        crate::routes::assets::update_asset,
        crate::routes::assets::delete_asset,
        crate::routes::assets::field_values,
        crate::routes::assets::expiring_assets,
        crate::routes::assets::export_assets,
        crate::routes::assets::batch_import,
        crate::routes::assets::import_template,
        crate::routes::tags::list_tags,
        crate::routes::tags::create_tag,
        crate::routes::tags::update_tag,
        crate::routes::tags::delete_tag,
        crate::routes::tags::get_asset_tags,
        crate::routes::tags::add_asset_tags,
        crate::routes::tags::set_asset_tags,
        crate::routes::tags::remove_asset_tag,
        crate::routes::cloud_accounts::list_accounts,
        crate::routes::cloud_accounts::create_account,
        crate::routes::cloud_accounts::get_account,
        crate::routes::cloud_accounts::update_account,
        crate::routes::cloud_accounts::delete_account,
        crate::routes::cloud_accounts::add_access_key,
        crate::routes::cloud_accounts::update_access_key,
        crate::routes::cloud_accounts::delete_access_key,
        crate::routes::migration::export_snapshot,
        crate::routes::migration::import_snapshot,
    ),
    components(
        schemas(
            HealthResponse,
            DatabaseHealth,
            ComponentsHealth,
            FieldValuesResponse,
            ErrorResponse,
            TagIdsRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Metrics", description = "Prometheus metrics"),
        (name = "Assets", description = "Assets, CSV export and spreadsheet import"),
        (name = "Tags", description = "Tags and asset tagging"),
        (name = "Cloud Accounts", description = "Cloud accounts and access keys"),
        (name = "Migration", description = "Whole-database snapshot export and import (admin)"),
    ),
    info(
        title = "CMDB API",
        version = "0.1.0",
        description = "Asset, credential and cloud account inventory",
        license(name = "MIT"),
    )
)]
pub struct ApiDoc;

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Creates a new API server.
    pub fn new(state: AppState, config: ApiServerConfig) -> Self {
        Self { config, state }
    }

    /// Creates a new API server with default configuration.
    pub fn with_state(state: AppState) -> Self {
        Self::new(state, ApiServerConfig::default())
    }

    /// Builds the router.
    pub fn router(&self) -> Router {
        // Initialize start time for uptime calculation
        routes::health::init_start_time();

        let mut app = routes::create_router(self.state.clone());

        if self.config.enable_swagger {
            app = app.merge(
                SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
            );
        }

        // Apply middleware (order matters: innermost first)
        app
            .layer(middleware::from_fn(security_headers))
            .layer(middleware::from_fn(request_logging))
            .layer(middleware::from_fn(request_id))
            .layer(TimeoutLayer::new(self.config.request_timeout))
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&self.config.cors_origins))
            // Catch panics and return 500
            .layer(CatchPanicLayer::new())
    }

    /// Runs the server until Ctrl+C or SIGTERM.
    pub async fn run(self) -> Result<(), std::io::Error> {
        self.run_until(shutdown_signal()).await
    }

    /// Runs the server with a custom shutdown signal.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let addr = self.config.bind_address;

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, swagger = self.config.enable_swagger, "Starting API server");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server shut down gracefully");
        Ok(())
    }
}

/// Default shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
