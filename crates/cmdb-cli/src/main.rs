//! CMDB CLI
//!
//! Command-line interface for the configuration-management database:
//! runs the API server and performs offline administration against the
//! same SQLite database.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod config;

use commands::ServeConfig;
use config::AppConfig;

#[derive(Parser)]
#[command(name = "cmdb")]
#[command(version)]
#[command(about = "Configuration-management database for assets, credentials and cloud accounts", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true, env = "CMDB_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Database URL
        #[arg(short, long)]
        database: Option<String>,

        /// Disable Swagger UI
        #[arg(long)]
        no_swagger: bool,
    },

    /// Export the database as a JSON snapshot
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Import a JSON snapshot
    Import {
        /// Snapshot file
        file: PathBuf,
    },

    /// Manage API keys
    ApiKey {
        #[command(subcommand)]
        action: ApiKeyCommands,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Generate a base64 encryption key for secrets at rest
    GenerateKey,

    /// Show the effective configuration
    Config {
        /// Print secrets instead of redacting them
        #[arg(long)]
        show_secrets: bool,
    },
}

#[derive(Subcommand)]
enum ApiKeyCommands {
    /// Create an API key for a user
    Create {
        /// Owner of the key
        #[arg(short, long)]
        username: String,

        /// Descriptive name for the key
        #[arg(short, long, default_value = "cli")]
        name: String,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user
    Create {
        #[arg(short, long)]
        username: String,

        /// Role (admin, user)
        #[arg(short, long, default_value = "user")]
        role: String,

        /// Password; generated and printed when omitted
        #[arg(short, long, env = "CMDB_USER_PASSWORD")]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = AppConfig::load_or_default(&config_path)?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let logging = cmdb_observability::LoggingConfig::from_settings(level, config.logging.json)?;
    if let Err(e) = cmdb_observability::init_logging_with_config(logging) {
        eprintln!("{}: {}", "Logging disabled".yellow(), e);
    }

    match cli.command {
        Commands::Serve {
            port,
            host,
            database,
            no_swagger,
        } => {
            commands::run_server(
                ServeConfig {
                    port,
                    host,
                    database_url: database,
                    no_swagger,
                },
                config,
            )
            .await
        }
        Commands::Export { output } => commands::export_snapshot(&config, output.as_deref()).await,
        Commands::Import { file } => {
            let result = commands::import_snapshot(&config, &file).await?;
            if !result.errors.is_empty() {
                std::process::exit(2);
            }
            Ok(())
        }
        Commands::ApiKey {
            action: ApiKeyCommands::Create { username, name },
        } => commands::create_api_key(&config, &username, &name)
            .await
            .map(|_| ()),
        Commands::User {
            action:
                UserCommands::Create {
                    username,
                    role,
                    password,
                },
        } => commands::create_user(&config, &username, &role, password.as_deref())
            .await
            .map(|_| ()),
        Commands::GenerateKey => {
            commands::generate_key();
            Ok(())
        }
        Commands::Config { show_secrets } => cmd_config(&config, &config_path, show_secrets),
    }
}

fn default_config_path() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("com", "cmdb", "cmdb") {
        dirs.config_dir().join("config.yaml")
    } else {
        PathBuf::from("config/cmdb.yaml")
    }
}

fn cmd_config(config: &AppConfig, path: &std::path::Path, show_secrets: bool) -> Result<()> {
    let display_config = if show_secrets {
        config.clone()
    } else {
        config.redact_secrets()
    };

    let source = if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", path.display())
    };
    println!("{} {}", "# Config file:".dimmed(), source.dimmed());
    print!("{}", serde_yaml::to_string(&display_config)?);
    Ok(())
}
