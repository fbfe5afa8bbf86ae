//! Argon2id password hashing for user accounts.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

/// Shortest password accepted for a user account.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Password hashing errors.
#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),

    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    #[error("Invalid password hash format")]
    InvalidHash,
}

/// Hashes a password into a PHC string.
///
/// ```
/// use cmdb_core::auth::password::hash_password;
///
/// let hash = hash_password("correct horse").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashError(e.to_string()))
}

/// Verifies a password against a stored PHC hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHash)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(e.to_string())),
    }
}

/// Returns the reasons a password is too weak, empty if acceptable.
///
/// A password needs at least [`MIN_PASSWORD_LENGTH`] characters with at
/// least one letter and one digit.
pub fn validate_password_strength(password: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push("Password must be at least 8 characters long");
    }
    if !password.chars().any(char::is_alphabetic) {
        problems.push("Password must contain at least one letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("Password must contain at least one digit");
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("Admin12345").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("Admin12345", &hash).unwrap());
        assert!(!verify_password("admin12345", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let first = hash_password("same-password-1").unwrap();
        let second = hash_password("same-password-1").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_invalid_hash() {
        assert!(matches!(
            verify_password("x", "not-a-phc-string"),
            Err(PasswordError::InvalidHash)
        ));
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("abc12345").is_empty());
        assert_eq!(validate_password_strength("short1").len(), 1);
        assert_eq!(validate_password_strength("12345678").len(), 1);
        assert_eq!(validate_password_strength("").len(), 3);
    }
}
