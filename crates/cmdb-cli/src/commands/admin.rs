//! Account provisioning commands.

use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use tracing::info;

use cmdb_core::crypto::generate_encryption_key;
use cmdb_core::db::seed::generate_secure_password;
use cmdb_core::db::{
    create_api_key_repository, create_user_repository, ApiKeyRepository, UserRepository,
};
use cmdb_core::{hash_password, validate_password_strength, ApiKey, Role, User};

use super::open_database;
use crate::config::AppConfig;

/// Issues an API key for an existing user and prints it once.
///
/// Returns the raw key.
pub async fn create_api_key(config: &AppConfig, username: &str, name: &str) -> Result<String> {
    let pool = open_database(&config.database.url, config).await?;

    let user = create_user_repository(&pool)
        .get_by_username(username)
        .await?
        .ok_or_else(|| anyhow!("User '{}' not found", username))?;
    if !user.is_active {
        bail!("User '{}' is disabled", username);
    }

    let (api_key, raw_key) = ApiKey::new(user.id, name);
    create_api_key_repository(&pool)
        .create(&api_key)
        .await
        .context("Failed to store API key")?;
    pool.close().await;

    info!(user_id = user.id, prefix = %api_key.key_prefix, "API key created");
    println!("{} API key '{}' for {}", "✓".green(), name, username.cyan());
    println!();
    println!("  {}", raw_key.bold());
    println!();
    println!(
        "{}",
        "Store this key now. It cannot be shown again.".yellow()
    );

    Ok(raw_key)
}

/// Creates a user. Without a password one is generated and printed.
pub async fn create_user(
    config: &AppConfig,
    username: &str,
    role: &str,
    password: Option<&str>,
) -> Result<User> {
    let username = username.trim();
    if !(3..=50).contains(&username.chars().count()) {
        bail!("Username must be 3-50 characters");
    }
    let role: Role = role
        .parse()
        .map_err(|_| anyhow!("Invalid role '{}'. Valid roles are: admin, user", role))?;

    let (password, generated) = match password {
        Some(p) => (p.to_string(), false),
        None => (generate_secure_password(), true),
    };
    let problems = validate_password_strength(&password);
    if !problems.is_empty() {
        bail!("Weak password: {}", problems.join("; "));
    }
    let password_hash = hash_password(&password).context("Failed to hash password")?;

    let pool = open_database(&config.database.url, config).await?;
    let user_repo = create_user_repository(&pool);
    if user_repo.get_by_username(username).await?.is_some() {
        bail!("Username '{}' is already taken", username);
    }
    let user = user_repo
        .create(&User::new(username, None, Some(password_hash), role))
        .await
        .context("Failed to create user")?;
    pool.close().await;

    info!(user_id = user.id, username = %user.username, role = %role.as_str(), "User created");
    println!(
        "{} Created {} user {}",
        "✓".green(),
        role.as_str(),
        user.username.cyan()
    );
    if generated {
        println!("  {} {}", "Password:".cyan(), password.bold());
    }

    Ok(user)
}

/// Prints a fresh base64 encryption key.
pub fn generate_key() -> String {
    let key = generate_encryption_key();
    println!("{}", key);
    eprintln!(
        "{}",
        "Set this as CMDB_ENCRYPTION_KEY or security.encryption_key. \
         Losing it makes stored secrets unreadable."
            .yellow()
    );
    key
}
