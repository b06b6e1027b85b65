//! Identity repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use stockroom_core::{Email, Role, StoreId, UserId};

use super::map_constraint_error;
use crate::db::{IdentityRepository, RepositoryError};
use crate::models::{Identity, NewIdentity};

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: UserId,
    store_id: StoreId,
    email: String,
    name: Option<String>,
    role: Role,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    #[sqlx(flatten)]
    identity: IdentityRow,
    password_hash: String,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = RepositoryError;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            store_id: row.store_id,
            email,
            name: row.name,
            role: row.role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// `PostgreSQL`-backed [`IdentityRepository`].
pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    /// Create a new identity repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    #[tracing::instrument(skip(self, identity), fields(email = %identity.email, store_id = %identity.store_id))]
    async fn create(&self, identity: NewIdentity) -> Result<Identity, RepositoryError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r"
            INSERT INTO users (store_id, email, name, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, store_id, email, name, role, created_at, updated_at
            ",
        )
        .bind(identity.store_id)
        .bind(&identity.email)
        .bind(identity.name.as_deref())
        .bind(&identity.password_hash)
        .bind(identity.role)
        .fetch_one(&self.pool)
        .await
        .map_err(map_constraint_error)?;

        row.try_into()
    }

    async fn find(&self, id: UserId) -> Result<Option<Identity>, RepositoryError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r"
            SELECT id, store_id, email, name, role, created_at, updated_at
            FROM users
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Identity::try_from).transpose()
    }

    async fn find_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(Identity, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r"
            SELECT id, store_id, email, name, role, created_at, updated_at, password_hash
            FROM users
            WHERE lower(email) = $1
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Ok((Identity::try_from(r.identity)?, r.password_hash)))
            .transpose()
    }
}
