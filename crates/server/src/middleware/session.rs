//! Session middleware configuration.
//!
//! The same layer is used with the `PostgreSQL` store in production and
//! with `tower_sessions::MemoryStore` for the in-memory backend.

use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

use crate::config::ServerConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "stockroom_session";

/// Create the session layer over `store`.
///
/// Sessions expire after `session_ttl` of inactivity. The cookie is marked
/// secure when the base URL is https.
#[must_use]
pub fn create_session_layer<S>(store: S, config: &ServerConfig) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    let ttl_seconds = i64::try_from(config.session_ttl.as_secs()).unwrap_or(i64::MAX);

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(ttl_seconds),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
