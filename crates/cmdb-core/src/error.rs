//! Error taxonomy shared by the CMDB stores.

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::db::DbError;
use crate::validation::ValidationErrors;

/// Errors returned by store operations.
#[derive(Error, Debug)]
pub enum CmdbError {
    /// One or more fields failed validation.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// A uniqueness rule was violated (duplicate tag, duplicate natural key).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The addressed record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The caller lacks a required capability.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Database(DbError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Result alias for store operations.
pub type CmdbResult<T> = Result<T, CmdbError>;

impl CmdbError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        CmdbError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Shorthand for a single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        CmdbError::Validation(ValidationErrors::single(field, message))
    }
}

impl From<ValidationErrors> for CmdbError {
    fn from(errors: ValidationErrors) -> Self {
        CmdbError::Validation(errors)
    }
}

impl From<DbError> for CmdbError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => CmdbError::NotFound { entity, id },
            DbError::Constraint(msg) => CmdbError::Conflict(msg),
            other => CmdbError::Database(other),
        }
    }
}

impl From<sqlx::Error> for CmdbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}
