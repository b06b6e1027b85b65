//! Subcommand implementations.
//!
//! Every command connects to the database named by `STOCKROOM_DATABASE_URL`
//! (or `DATABASE_URL`), loaded the same way the server loads it.

pub mod migrate;
pub mod store;
pub mod user;

use sqlx::PgPool;
use thiserror::Error;

use stockroom_core::ValidationErrors;
use stockroom_server::config::{ConfigError, ServerConfig};
use stockroom_server::db::{self, RepositoryError};
use stockroom_server::services::AuthError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Session store migration error: {0}")]
    SessionStore(String),

    #[error("{0}")]
    Invalid(#[from] ValidationErrors),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: admin, employee")]
    InvalidRole(String),

    #[error("No store with slug: {0}")]
    UnknownStore(String),
}

/// Connect to the configured database.
pub async fn connect() -> Result<PgPool, CommandError> {
    let config = ServerConfig::from_env()?;
    let url = config
        .database_url
        .as_ref()
        .ok_or(CommandError::MissingEnvVar("STOCKROOM_DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    Ok(db::create_pool(url).await?)
}
