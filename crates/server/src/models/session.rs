//! Values kept in the server-side session.

use serde::{Deserialize, Serialize};

use stockroom_core::UserId;

/// Session keys.
pub mod session_keys {
    /// The signed-in identity.
    pub const CURRENT_USER: &str = "stockroom.user";
    /// Forgery protection token bound to this session.
    pub const CSRF_TOKEN: &str = "stockroom.csrf_token";
}

/// What the session remembers about the signed-in identity.
///
/// Only the id is stored; the identity itself is re-read on every request
/// so a deleted user or store stops resolving immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
}
