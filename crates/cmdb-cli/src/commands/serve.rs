//! Serve command - starts the API server.

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

use cmdb_api::{ApiServer, ApiServerConfig, AppState};
use cmdb_core::create_cipher;
use cmdb_core::db::seed::ensure_admin_user;

use super::open_database;
use crate::config::AppConfig;

/// Command-line overrides for `serve`.
#[derive(Debug, Clone, Default)]
pub struct ServeConfig {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub database_url: Option<String>,
    pub no_swagger: bool,
}

impl ServeConfig {
    /// Resolves the server settings against the loaded configuration.
    pub fn server_config(&self, app_config: &AppConfig) -> Result<ApiServerConfig> {
        let host = self.host.as_deref().unwrap_or(&app_config.server.host);
        let port = self.port.unwrap_or(app_config.server.port);
        let bind_address: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", host, port))?;

        Ok(ApiServerConfig {
            bind_address,
            request_timeout: Duration::from_secs(app_config.server.request_timeout_secs),
            enable_swagger: app_config.server.enable_swagger && !self.no_swagger,
            cors_origins: app_config.server.cors_origins.clone(),
        })
    }
}

/// Runs the API server until it receives a shutdown signal.
pub async fn run_server(serve: ServeConfig, app_config: AppConfig) -> Result<()> {
    println!("{} Starting CMDB API server...", "[server]".cyan());

    let prometheus = cmdb_observability::install_prometheus_recorder()
        .context("Failed to install metrics recorder")?;

    let database_url = serve
        .database_url
        .clone()
        .unwrap_or_else(|| app_config.database.url.clone());
    println!("  {} Database: {}", "→".green(), database_url);
    let db_pool = open_database(&database_url, &app_config).await?;
    println!("  {} Migrations complete", "✓".green());

    if let Some(password) = ensure_admin_user(&db_pool)
        .await
        .map_err(|e| anyhow!("Failed to seed admin user: {}", e))?
    {
        println!();
        println!("{}", "Created default admin user".yellow().bold());
        println!("  {} admin", "Username:".cyan());
        println!("  {} {}", "Password:".cyan(), password);
        println!("{}", "This password is shown only once.".yellow());
        println!();
    }

    let cipher = create_cipher(app_config.security.encryption_key.as_deref())
        .context("Invalid encryption key")?;
    if cipher.algorithm() == "plaintext" {
        warn!("Running without an encryption key; secrets are stored unencrypted");
    }

    let upload_dir = app_config.storage.upload_dir.clone();
    std::fs::create_dir_all(&upload_dir)
        .with_context(|| format!("Failed to create upload dir {}", upload_dir.display()))?;

    let state = AppState::new(db_pool, cipher)
        .with_upload_dir(upload_dir.clone())
        .with_prometheus_handle(prometheus);

    let server_config = serve.server_config(&app_config)?;
    let bind_address = server_config.bind_address;

    println!();
    println!("{}", "CMDB API Server".bold());
    println!("{}", "═".repeat(40));
    println!("  {} http://{}", "Address:".cyan(), bind_address);
    println!("  {} {}", "Uploads:".cyan(), upload_dir.display());
    if server_config.enable_swagger {
        println!(
            "  {} http://{}/swagger-ui",
            "Swagger UI:".cyan(),
            bind_address
        );
    }
    println!();
    println!("{}", "Endpoints:".bold());
    println!("  GET  /health                    - Health check");
    println!("  GET  /metrics                   - Prometheus metrics");
    println!("  *    /api/v1/assets             - Assets, export and batch import");
    println!("  *    /api/v1/tags               - Tags and asset tagging");
    println!("  *    /api/v1/credentials        - Asset credentials");
    println!("  *    /api/v1/cloud-accounts     - Cloud accounts and access keys");
    println!("  *    /api/v1/migration          - Snapshot export/import (admin)");
    println!("  *    /api/v1/users              - User management (admin)");
    println!();
    println!("Press {} to stop", "Ctrl+C".yellow());
    println!();

    info!(%bind_address, "Serving");
    let server = ApiServer::new(state, server_config);
    server.run().await.context("Server error")?;

    println!();
    println!("{} Server stopped", "[server]".cyan());

    Ok(())
}
