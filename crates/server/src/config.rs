//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional.
//!
//! - `STOCKROOM_HOST` - Bind address (default: 127.0.0.1)
//! - `STOCKROOM_PORT` - Listen port (default: 3000)
//! - `STOCKROOM_BASE_URL` - Public URL (default: `http://localhost:3000`); an
//!   `https://` URL marks the session cookie `Secure`
//! - `STOCKROOM_DATABASE_URL` - `PostgreSQL` connection string, falling back to
//!   `DATABASE_URL`. Without either, the server runs on the in-memory backend.
//! - `STOCKROOM_SESSION_TTL_SECS` - Session inactivity expiry (default: 7 days)
//! - `STOCKROOM_LOCK_TIMEOUT_MS` - Bounded wait for the stock adjustment row
//!   lock (default: 2000)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2000;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: String,
    /// `PostgreSQL` connection URL (contains password); `None` selects the
    /// in-memory backend
    pub database_url: Option<SecretString>,
    /// Session inactivity expiry
    pub session_ttl: Duration,
    /// Upper bound on waiting for a product row lock
    pub lock_timeout: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            database_url: None,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = parse_or("STOCKROOM_HOST", &lookup, defaults.host)?;
        let port = parse_or("STOCKROOM_PORT", &lookup, defaults.port)?;
        let base_url = lookup("STOCKROOM_BASE_URL").unwrap_or(defaults.base_url);
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("STOCKROOM_BASE_URL".to_string(), e.to_string())
        })?;

        // Fall back to generic DATABASE_URL (set by most hosting providers)
        let database_url = lookup("STOCKROOM_DATABASE_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .filter(|url| !url.trim().is_empty())
            .map(SecretString::from);

        let session_ttl = Duration::from_secs(parse_or(
            "STOCKROOM_SESSION_TTL_SECS",
            &lookup,
            DEFAULT_SESSION_TTL_SECS,
        )?);
        let lock_timeout = Duration::from_millis(parse_or(
            "STOCKROOM_LOCK_TIMEOUT_MS",
            &lookup,
            DEFAULT_LOCK_TIMEOUT_MS,
        )?);
        if lock_timeout.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "STOCKROOM_LOCK_TIMEOUT_MS".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            base_url,
            database_url,
            session_ttl,
            lock_timeout,
            sentry_dsn: lookup("SENTRY_DSN"),
            sentry_environment: lookup("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

/// Parse an optional variable, using `default` when it is unset.
fn parse_or<T>(
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}
