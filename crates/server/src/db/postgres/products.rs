//! Product repository.
//!
//! Inserts are single-statement and rely on Postgres row atomicity. `update`,
//! `delete` and `adjust_on_hand` run in a transaction that first takes the
//! row with `SELECT ... FOR UPDATE`, bounded by a transaction-local
//! `lock_timeout`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};

use stockroom_core::{Product, ProductFields, ProductId, ProductPatch, StoreId};

use super::map_constraint_error;
use crate::db::{
    ProductRepository, RepositoryError, SKU_TAKEN, apply_delta, changed_sku,
};

const COLUMNS: &str =
    "id, store_id, name, sku, reorder_point, on_hand, max, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    store_id: StoreId,
    name: String,
    sku: String,
    reorder_point: i32,
    on_hand: i32,
    max: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            store_id: row.store_id,
            name: row.name,
            sku: row.sku,
            reorder_point: row.reorder_point,
            on_hand: row.on_hand,
            max: row.max,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// `PostgreSQL`-backed [`ProductRepository`].
pub struct PgProductRepository {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgProductRepository {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Begin a transaction and lock one product row of `store`.
    async fn lock_row(
        &self,
        store: StoreId,
        id: ProductId,
    ) -> Result<(Transaction<'static, Postgres>, Product), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // SET does not accept bind parameters; the value is an integer we format ourselves.
        let timeout_ms = self.lock_timeout.as_millis().max(1);
        sqlx::query(&format!("SET LOCAL lock_timeout = '{timeout_ms}ms'"))
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {COLUMNS} FROM products WHERE id = $1 AND store_id = $2 FOR UPDATE"
        ))
        .bind(id)
        .bind(store)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_constraint_error)?
        .ok_or(RepositoryError::NotFound)?;

        Ok((tx, row.into()))
    }
}

async fn sku_exists<'e>(
    executor: impl PgExecutor<'e>,
    store: StoreId,
    sku: &str,
) -> Result<bool, RepositoryError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM products WHERE store_id = $1 AND sku = $2)",
    )
    .bind(store)
    .bind(sku)
    .fetch_one(executor)
    .await?;
    Ok(exists)
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    #[tracing::instrument(skip(self))]
    async fn list(&self, store: StoreId) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {COLUMNS} FROM products WHERE store_id = $1 ORDER BY lower(name), name, id"
        ))
        .bind(store)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    #[tracing::instrument(skip(self, fields), fields(sku = %fields.sku))]
    async fn create(
        &self,
        store: StoreId,
        fields: ProductFields,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            INSERT INTO products (store_id, name, sku, reorder_point, on_hand, max)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COLUMNS}
            "
        ))
        .bind(store)
        .bind(&fields.name)
        .bind(&fields.sku)
        .bind(fields.reorder_point)
        .bind(fields.on_hand)
        .bind(fields.max)
        .fetch_one(&self.pool)
        .await
        .map_err(map_constraint_error)?;

        Ok(row.into())
    }

    #[tracing::instrument(skip(self, patch))]
    async fn update(
        &self,
        store: StoreId,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RepositoryError> {
        let (mut tx, current) = self.lock_row(store, id).await?;
        let merged = match patch.apply_to(&current.fields()) {
            Ok(merged) => merged,
            Err(mut errors) => {
                if let Some(sku) = changed_sku(patch, &current) {
                    if sku_exists(&mut *tx, store, sku).await? {
                        errors.add("sku", SKU_TAKEN);
                    }
                }
                return Err(RepositoryError::Invalid(errors));
            }
        };

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            UPDATE products
            SET name = $3, sku = $4, reorder_point = $5, on_hand = $6, max = $7,
                updated_at = now()
            WHERE id = $1 AND store_id = $2
            RETURNING {COLUMNS}
            "
        ))
        .bind(id)
        .bind(store)
        .bind(&merged.name)
        .bind(&merged.sku)
        .bind(merged.reorder_point)
        .bind(merged.on_hand)
        .bind(merged.max)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_constraint_error)?;

        tx.commit().await?;
        Ok(row.into())
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, store: StoreId, id: ProductId) -> Result<(), RepositoryError> {
        let (mut tx, _) = self.lock_row(store, id).await?;
        sqlx::query("DELETE FROM products WHERE id = $1 AND store_id = $2")
            .bind(id)
            .bind(store)
            .execute(&mut *tx)
            .await
            .map_err(map_constraint_error)?;

        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn sku_taken(&self, store: StoreId, sku: &str) -> Result<bool, RepositoryError> {
        sku_exists(&self.pool, store, sku).await
    }

    #[tracing::instrument(skip(self))]
    async fn adjust_on_hand(
        &self,
        store: StoreId,
        id: ProductId,
        delta: i32,
    ) -> Result<Product, RepositoryError> {
        let (mut tx, current) = self.lock_row(store, id).await?;
        let on_hand = apply_delta(current.on_hand, delta)?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            UPDATE products
            SET on_hand = $3, updated_at = now()
            WHERE id = $1 AND store_id = $2
            RETURNING {COLUMNS}
            "
        ))
        .bind(id)
        .bind(store)
        .bind(on_hand)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }
}
