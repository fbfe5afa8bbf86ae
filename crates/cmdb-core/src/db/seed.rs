//! Database seeding utilities.
//!
//! Creates the default admin user on first run.

use super::{create_user_repository, DbPool};
use crate::auth::{password::hash_password, Role, User};
use rand::Rng;
use tracing::{info, warn};

/// Environment variable holding the initial admin password.
pub const ADMIN_PASSWORD_ENV: &str = "CMDB_ADMIN_PASSWORD";

/// Ensures a default admin user exists in the database.
///
/// If no users exist, creates `admin` with the password from
/// `CMDB_ADMIN_PASSWORD`, or a random one.
///
/// # Returns
///
/// `Ok(Some(password))` if a new admin was created
/// `Ok(None)` if users already exist
pub async fn ensure_admin_user(
    pool: &DbPool,
) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
    let user_repo = create_user_repository(pool);

    if user_repo.any_exist().await? {
        info!("Users already exist, skipping admin seed");
        return Ok(None);
    }

    let password = std::env::var(ADMIN_PASSWORD_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| {
            warn!("No {} set, generated random password", ADMIN_PASSWORD_ENV);
            generate_secure_password()
        });

    let password_hash = hash_password(&password)?;
    let admin = User::new("admin", None, Some(password_hash), Role::Admin);
    user_repo.create(&admin).await?;

    info!("Created default admin user: admin");

    Ok(Some(password))
}

/// Generates a 16 character password with at least one uppercase letter,
/// lowercase letter, digit and symbol.
pub fn generate_secure_password() -> String {
    const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    const DIGITS: &[u8] = b"0123456789";
    const SPECIAL: &[u8] = b"!@#$%^&*";

    let mut rng = rand::thread_rng();
    let mut password = Vec::with_capacity(16);

    for set in [UPPER, LOWER, DIGITS, SPECIAL] {
        password.push(set[rng.gen_range(0..set.len())]);
    }

    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIAL].concat();
    for _ in 0..12 {
        password.push(all[rng.gen_range(0..all.len())]);
    }

    for i in (1..password.len()).rev() {
        let j = rng.gen_range(0..=i);
        password.swap(i, j);
    }

    password.into_iter().map(char::from).collect()
}
