//! Session lifecycle on top of `tower-sessions`.
//!
//! The session record lives server-side; the browser only carries the
//! opaque session id in the `stockroom_session` cookie. Signing in rotates
//! that id so a token planted before login is never promoted.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use thiserror::Error;
use tower_sessions::{Session, session::Id};

use stockroom_core::UserId;

use crate::models::{Identity, SessionUser, session_keys};

/// Session store failure.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store error: {0}")]
    Store(#[from] tower_sessions::session::Error),

    /// The store did not assign an id when the session was saved.
    #[error("session was not persisted")]
    NotPersisted,
}

/// Per-session forgery protection token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    /// Generate a new random token (256-bit, URL-safe base64).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// The token as submitted by clients.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a submitted token in constant time.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        constant_time_eq(self.0.as_bytes(), candidate.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Start an authenticated session for `identity`.
///
/// Rotates the session id, binds the identity and a fresh CSRF token, and
/// persists the record. Returns the new session id.
///
/// # Errors
///
/// Returns `SessionError` if the session store fails.
pub async fn create(session: &Session, identity: &Identity) -> Result<Id, SessionError> {
    session.cycle_id().await?;
    session
        .insert(session_keys::CURRENT_USER, SessionUser { id: identity.id })
        .await?;
    session
        .insert(session_keys::CSRF_TOKEN, CsrfToken::generate().0)
        .await?;
    session.save().await?;

    tracing::debug!(user_id = %identity.id, "session created");
    session.id().ok_or(SessionError::NotPersisted)
}

/// The user id bound to this session, if it is live.
///
/// # Errors
///
/// Returns `SessionError` if the session store fails.
pub async fn resolve(session: &Session) -> Result<Option<UserId>, SessionError> {
    Ok(session
        .get::<SessionUser>(session_keys::CURRENT_USER)
        .await?
        .map(|user| user.id))
}

/// The CSRF token bound to this session, if any.
///
/// # Errors
///
/// Returns `SessionError` if the session store fails.
pub async fn csrf_token(session: &Session) -> Result<Option<CsrfToken>, SessionError> {
    Ok(session
        .get::<String>(session_keys::CSRF_TOKEN)
        .await?
        .map(CsrfToken))
}

/// End the session. Destroying an already-ended session succeeds.
///
/// # Errors
///
/// Returns `SessionError` if the session store fails.
pub async fn destroy(session: &Session) -> Result<(), SessionError> {
    session.flush().await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use stockroom_core::{Email, Role, StoreId};
    use tower_sessions::MemoryStore;

    use super::*;

    fn identity() -> Identity {
        Identity {
            id: UserId::new(7),
            store_id: StoreId::new(1),
            email: Email::parse("clerk@shop.com").unwrap(),
            name: None,
            role: Role::Employee,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_csrf_token_matching() {
        let token = CsrfToken::generate();
        assert_eq!(token.as_str().len(), 43);
        assert!(token.matches(token.as_str()));
        assert!(!token.matches(""));
        assert!(!token.matches(&CsrfToken::generate().0));
        assert_ne!(token, CsrfToken::generate());
    }

    #[tokio::test]
    async fn test_create_resolve_destroy() {
        let store = Arc::new(MemoryStore::default());

        let login = Session::new(None, store.clone(), None);
        let id = create(&login, &identity()).await.unwrap();

        let next_request = Session::new(Some(id), store.clone(), None);
        assert_eq!(resolve(&next_request).await.unwrap(), Some(UserId::new(7)));
        assert!(csrf_token(&next_request).await.unwrap().is_some());

        destroy(&next_request).await.unwrap();
        destroy(&next_request).await.unwrap();

        let after_logout = Session::new(Some(id), store, None);
        assert_eq!(resolve(&after_logout).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_rotates_session_id() {
        let store = Arc::new(MemoryStore::default());

        let anonymous = Session::new(None, store.clone(), None);
        anonymous.insert("seen", true).await.unwrap();
        anonymous.save().await.unwrap();
        let planted = anonymous.id().unwrap();

        let login = Session::new(Some(planted), store.clone(), None);
        let id = create(&login, &identity()).await.unwrap();
        assert_ne!(id, planted);

        let replay = Session::new(Some(planted), store, None);
        assert_eq!(resolve(&replay).await.unwrap(), None);
    }
}
