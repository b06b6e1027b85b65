//! Identity (user) domain model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use stockroom_core::{Email, Role, StoreId, UserId};

/// An authenticated principal. Every identity belongs to exactly one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: UserId,
    pub store_id: StoreId,
    pub email: Email,
    pub name: Option<String>,
    pub role: Role,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
}

/// A validated identity ready to be persisted.
///
/// Only the auth service builds these, after hashing the password.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub store_id: StoreId,
    pub email: Email,
    pub name: Option<String>,
    pub role: Role,
    pub password_hash: String,
}
