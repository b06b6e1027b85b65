//! Store repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use stockroom_core::StoreId;

use super::map_constraint_error;
use crate::db::{RepositoryError, StoreRepository};
use crate::models::{NewStore, Store};

#[derive(sqlx::FromRow)]
struct StoreRow {
    id: StoreId,
    name: String,
    slug: String,
    created_at: DateTime<Utc>,
}

impl From<StoreRow> for Store {
    fn from(row: StoreRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            created_at: row.created_at,
        }
    }
}

/// `PostgreSQL`-backed [`StoreRepository`].
pub struct PgStoreRepository {
    pool: PgPool,
}

impl PgStoreRepository {
    /// Create a new store repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreRepository for PgStoreRepository {
    #[tracing::instrument(skip(self), fields(slug = %store.slug))]
    async fn create(&self, store: NewStore) -> Result<Store, RepositoryError> {
        let row = sqlx::query_as::<_, StoreRow>(
            r"
            INSERT INTO stores (name, slug)
            VALUES ($1, $2)
            RETURNING id, name, slug, created_at
            ",
        )
        .bind(&store.name)
        .bind(&store.slug)
        .fetch_one(&self.pool)
        .await
        .map_err(map_constraint_error)?;

        Ok(row.into())
    }

    async fn list(&self) -> Result<Vec<Store>, RepositoryError> {
        let rows = sqlx::query_as::<_, StoreRow>(
            r"
            SELECT id, name, slug, created_at
            FROM stores
            ORDER BY lower(name), id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Store::from).collect())
    }

    async fn find(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query_as::<_, StoreRow>(
            "SELECT id, name, slug, created_at FROM stores WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Store::from))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query_as::<_, StoreRow>(
            "SELECT id, name, slug, created_at FROM stores WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Store::from))
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: StoreId) -> Result<(), RepositoryError> {
        // Users and products go with the store (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM stores WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
