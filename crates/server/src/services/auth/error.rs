//! Authentication error types.

use thiserror::Error;

use stockroom_core::ValidationErrors;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email or wrong password. The two are never distinguished.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Registration input rejected; carries every violated field.
    #[error("{0}")]
    Invalid(ValidationErrors),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
