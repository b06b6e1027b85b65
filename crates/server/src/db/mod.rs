//! Storage layer.
//!
//! Three repositories sit behind object-safe traits so the HTTP layer never
//! knows which backend it runs on:
//!
//! - [`StoreRepository`] - tenants
//! - [`IdentityRepository`] - users and their password hashes
//! - [`ProductRepository`] - per-store products, including the locked
//!   `adjust_on_hand` primitive
//!
//! Two backends implement them: [`postgres`] for production and [`memory`]
//! for local runs without a database and for tests.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p stockroom-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use stockroom_core::{
    Email, Product, ProductFields, ProductId, ProductPatch, StoreId, UserId, ValidationErrors,
};

use crate::models::{Identity, NewIdentity, NewStore, Store};

pub use memory::MemoryStorage;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found (or belongs to another store).
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Input rejected by a storage-level rule (e.g., duplicate SKU in a store).
    #[error("{0}")]
    Invalid(ValidationErrors),

    /// The row lock could not be acquired within the configured bound.
    #[error("timed out waiting for row lock")]
    LockTimeout,
}

/// Tenant persistence.
#[async_trait]
pub trait StoreRepository: Send + Sync {
    /// Create a store. A taken slug is reported as a `slug` field error.
    async fn create(&self, store: NewStore) -> Result<Store, RepositoryError>;

    /// All stores ordered by name.
    async fn list(&self) -> Result<Vec<Store>, RepositoryError>;

    async fn find(&self, id: StoreId) -> Result<Option<Store>, RepositoryError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Store>, RepositoryError>;

    /// Delete a store together with its identities and products.
    async fn delete(&self, id: StoreId) -> Result<(), RepositoryError>;
}

/// Identity persistence.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Persist a new identity. A taken email is reported as `Conflict`; an
    /// unknown store as a `store` field error.
    async fn create(&self, identity: NewIdentity) -> Result<Identity, RepositoryError>;

    async fn find(&self, id: UserId) -> Result<Option<Identity>, RepositoryError>;

    /// Identity and stored password hash for a normalized email.
    async fn find_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(Identity, String)>, RepositoryError>;
}

/// Product persistence. Every call names the store it acts on; callers obtain
/// that store from a [`crate::scope::StoreScope`], never from request input.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Products of `store`, ordered case-insensitively by name.
    async fn list(&self, store: StoreId) -> Result<Vec<Product>, RepositoryError>;

    /// Create a product from already-normalized fields.
    async fn create(
        &self,
        store: StoreId,
        fields: ProductFields,
    ) -> Result<Product, RepositoryError>;

    /// Merge `patch` over the stored row and write it, under the row lock.
    async fn update(
        &self,
        store: StoreId,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RepositoryError>;

    async fn delete(&self, store: StoreId, id: ProductId) -> Result<(), RepositoryError>;

    /// Whether `store` already has a product with this exact SKU.
    async fn sku_taken(&self, store: StoreId, sku: &str) -> Result<bool, RepositoryError>;

    /// Add `delta` to `on_hand` under an exclusive per-row lock.
    ///
    /// Concurrent adjustments of one product serialize; adjustments of
    /// different products never wait on each other. Fails with `LockTimeout`
    /// when the lock is not acquired within the configured bound.
    async fn adjust_on_hand(
        &self,
        store: StoreId,
        id: ProductId,
        delta: i32,
    ) -> Result<Product, RepositoryError>;
}

/// The repositories of one backend, shared across handlers.
#[derive(Clone)]
pub struct Repositories {
    pub stores: Arc<dyn StoreRepository>,
    pub identities: Arc<dyn IdentityRepository>,
    pub products: Arc<dyn ProductRepository>,
}

/// The storage backend the server runs on.
#[derive(Clone)]
pub enum Backend {
    Postgres(PgPool),
    Memory(MemoryStorage),
}

impl Backend {
    /// Build the repositories for this backend.
    #[must_use]
    pub fn repositories(&self, lock_timeout: Duration) -> Repositories {
        match self {
            Self::Postgres(pool) => Repositories {
                stores: Arc::new(postgres::PgStoreRepository::new(pool.clone())),
                identities: Arc::new(postgres::PgIdentityRepository::new(pool.clone())),
                products: Arc::new(postgres::PgProductRepository::new(
                    pool.clone(),
                    lock_timeout,
                )),
            },
            Self::Memory(storage) => {
                let storage = storage.clone().with_lock_timeout(lock_timeout);
                Repositories {
                    stores: Arc::new(storage.clone()),
                    identities: Arc::new(storage.clone()),
                    products: Arc::new(storage),
                }
            }
        }
    }

    /// Check that storage is reachable.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the database does not answer.
    pub async fn ping(&self) -> Result<(), RepositoryError> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
                Ok(())
            }
            Self::Memory(_) => Ok(()),
        }
    }

    /// Short backend name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }
}

pub(crate) const SKU_TAKEN: &str = "has already been taken";

/// SKU a patch would write, when it is non-blank and differs from the stored
/// one. Used to report a clash alongside other field errors.
fn changed_sku<'a>(patch: &'a ProductPatch, current: &Product) -> Option<&'a str> {
    patch
        .sku
        .as_deref()
        .map(str::trim)
        .filter(|sku| !sku.is_empty() && *sku != current.sku)
}

/// New on-hand quantity, refusing to go below zero or overflow.
fn apply_delta(on_hand: i32, delta: i32) -> Result<i32, RepositoryError> {
    on_hand
        .checked_add(delta)
        .filter(|value| *value >= 0)
        .ok_or_else(|| {
            RepositoryError::Invalid(ValidationErrors::single(
                "on_hand",
                "must be greater than or equal to 0",
            ))
        })
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
