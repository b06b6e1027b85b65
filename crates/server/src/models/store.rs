//! Store (tenant) domain model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use stockroom_core::{StoreId, ValidationErrors};

/// A tenant. Owns identities and products; deleting it removes both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a store.
#[derive(Debug, Clone)]
pub struct NewStore {
    pub name: String,
    pub slug: String,
}

impl NewStore {
    /// Trim the inputs and check the slug shape (`[a-z0-9-]+`).
    ///
    /// # Errors
    ///
    /// Returns every violated field.
    pub fn new(name: &str, slug: &str) -> Result<Self, ValidationErrors> {
        let name = name.trim().to_owned();
        let slug = slug.trim().to_owned();

        let mut errors = ValidationErrors::new();
        if name.is_empty() {
            errors.add("name", "can't be blank");
        }
        if slug.is_empty() {
            errors.add("slug", "can't be blank");
        } else if !slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            errors.add("slug", "is invalid");
        }

        errors.into_result().map(|()| Self { name, slug })
    }
}
