//! In-memory storage backend.
//!
//! Used when no database is configured and throughout the tests. Tables live
//! behind one `std::sync::Mutex` that is only ever held for short, non-async
//! critical sections. Product writes additionally take a per-row
//! `tokio::sync::Mutex`, acquired with a bounded wait, so the locking
//! behaviour matches the `SELECT ... FOR UPDATE` path of the Postgres backend.
//!
//! Lock order is always row lock, then table lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OwnedMutexGuard;

use stockroom_core::{
    Email, Product, ProductFields, ProductId, ProductPatch, StoreId, UserId, ValidationErrors,
};

use super::{
    IdentityRepository, ProductRepository, RepositoryError, SKU_TAKEN, StoreRepository,
    apply_delta, changed_sku,
};
use crate::models::{Identity, NewIdentity, NewStore, Store};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// In-memory implementation of every repository trait.
///
/// Clones share the same tables.
#[derive(Clone)]
pub struct MemoryStorage {
    tables: Arc<Mutex<Tables>>,
    lock_timeout: Duration,
}

#[derive(Default)]
struct Tables {
    stores: BTreeMap<StoreId, Store>,
    users: BTreeMap<UserId, UserRecord>,
    products: BTreeMap<ProductId, Product>,
    skus: HashMap<(StoreId, String), ProductId>,
    row_locks: HashMap<ProductId, Arc<tokio::sync::Mutex<()>>>,
    last_store_id: i32,
    last_user_id: i32,
    last_product_id: i32,
}

struct UserRecord {
    identity: Identity,
    password_hash: String,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Same tables, different bound on row lock waits.
    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // Every critical section leaves the tables consistent before it can panic.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire the exclusive lock of a product row owned by `store`.
    async fn lock_row(
        &self,
        store: StoreId,
        id: ProductId,
    ) -> Result<OwnedMutexGuard<()>, RepositoryError> {
        let lock = {
            let tables = self.tables();
            tables
                .products
                .get(&id)
                .filter(|product| product.store_id == store)
                .and_then(|_| tables.row_locks.get(&id).cloned())
        }
        .ok_or(RepositoryError::NotFound)?;

        tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(product_id = %id, "row lock wait timed out");
                RepositoryError::LockTimeout
            })
    }

    /// Hold a product's row lock, as a long-running writer would.
    #[cfg(test)]
    pub(crate) async fn hold_row_lock(
        &self,
        store: StoreId,
        id: ProductId,
    ) -> Result<OwnedMutexGuard<()>, RepositoryError> {
        self.lock_row(store, id).await
    }
}

impl Tables {
    fn scoped_product_mut(
        &mut self,
        store: StoreId,
        id: ProductId,
    ) -> Result<&mut Product, RepositoryError> {
        self.products
            .get_mut(&id)
            .filter(|product| product.store_id == store)
            .ok_or(RepositoryError::NotFound)
    }

    fn remove_product(&mut self, id: ProductId) {
        if let Some(product) = self.products.remove(&id) {
            self.skus.remove(&(product.store_id, product.sku));
        }
        self.row_locks.remove(&id);
    }
}

fn sku_clash() -> RepositoryError {
    RepositoryError::Invalid(ValidationErrors::single("sku", SKU_TAKEN))
}

#[async_trait]
impl StoreRepository for MemoryStorage {
    async fn create(&self, store: NewStore) -> Result<Store, RepositoryError> {
        let mut tables = self.tables();
        if tables.stores.values().any(|s| s.slug == store.slug) {
            return Err(RepositoryError::Invalid(ValidationErrors::single(
                "slug",
                "has already been taken",
            )));
        }

        tables.last_store_id += 1;
        let created = Store {
            id: StoreId::new(tables.last_store_id),
            name: store.name,
            slug: store.slug,
            created_at: Utc::now(),
        };
        tables.stores.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list(&self) -> Result<Vec<Store>, RepositoryError> {
        let mut stores: Vec<Store> = self.tables().stores.values().cloned().collect();
        stores.sort_by_cached_key(|s| (s.name.to_lowercase(), s.id));
        Ok(stores)
    }

    async fn find(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        Ok(self.tables().stores.get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Store>, RepositoryError> {
        Ok(self
            .tables()
            .stores
            .values()
            .find(|s| s.slug == slug)
            .cloned())
    }

    async fn delete(&self, id: StoreId) -> Result<(), RepositoryError> {
        let mut tables = self.tables();
        tables.stores.remove(&id).ok_or(RepositoryError::NotFound)?;

        tables.users.retain(|_, user| user.identity.store_id != id);
        let owned: Vec<ProductId> = tables
            .products
            .values()
            .filter(|p| p.store_id == id)
            .map(|p| p.id)
            .collect();
        for product_id in owned {
            tables.remove_product(product_id);
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityRepository for MemoryStorage {
    async fn create(&self, identity: NewIdentity) -> Result<Identity, RepositoryError> {
        let mut tables = self.tables();
        if !tables.stores.contains_key(&identity.store_id) {
            return Err(RepositoryError::Invalid(ValidationErrors::single(
                "store",
                "must exist",
            )));
        }
        if tables
            .users
            .values()
            .any(|u| u.identity.email == identity.email)
        {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        tables.last_user_id += 1;
        let now = Utc::now();
        let created = Identity {
            id: UserId::new(tables.last_user_id),
            store_id: identity.store_id,
            email: identity.email,
            name: identity.name,
            role: identity.role,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(
            created.id,
            UserRecord {
                identity: created.clone(),
                password_hash: identity.password_hash,
            },
        );
        Ok(created)
    }

    async fn find(&self, id: UserId) -> Result<Option<Identity>, RepositoryError> {
        Ok(self.tables().users.get(&id).map(|u| u.identity.clone()))
    }

    async fn find_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(Identity, String)>, RepositoryError> {
        Ok(self
            .tables()
            .users
            .values()
            .find(|u| &u.identity.email == email)
            .map(|u| (u.identity.clone(), u.password_hash.clone())))
    }
}

#[async_trait]
impl ProductRepository for MemoryStorage {
    async fn list(&self, store: StoreId) -> Result<Vec<Product>, RepositoryError> {
        let mut products: Vec<Product> = self
            .tables()
            .products
            .values()
            .filter(|p| p.store_id == store)
            .cloned()
            .collect();
        products.sort_by_cached_key(|p| (p.name.to_lowercase(), p.name.clone(), p.id));
        Ok(products)
    }

    async fn create(
        &self,
        store: StoreId,
        fields: ProductFields,
    ) -> Result<Product, RepositoryError> {
        let mut tables = self.tables();
        if !tables.stores.contains_key(&store) {
            return Err(RepositoryError::NotFound);
        }
        let key = (store, fields.sku.clone());
        if tables.skus.contains_key(&key) {
            return Err(sku_clash());
        }

        tables.last_product_id += 1;
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(tables.last_product_id),
            store_id: store,
            name: fields.name,
            sku: fields.sku,
            reorder_point: fields.reorder_point,
            on_hand: fields.on_hand,
            max: fields.max,
            created_at: now,
            updated_at: now,
        };
        tables.skus.insert(key, product.id);
        tables
            .row_locks
            .insert(product.id, Arc::new(tokio::sync::Mutex::new(())));
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update(
        &self,
        store: StoreId,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RepositoryError> {
        let _row = self.lock_row(store, id).await?;
        let mut tables = self.tables();

        let current = tables.scoped_product_mut(store, id)?.clone();
        let merged = match patch.apply_to(&current.fields()) {
            Ok(merged) => merged,
            Err(mut errors) => {
                if changed_sku(patch, &current)
                    .is_some_and(|sku| tables.skus.contains_key(&(store, sku.to_owned())))
                {
                    errors.add("sku", SKU_TAKEN);
                }
                return Err(RepositoryError::Invalid(errors));
            }
        };

        if merged.sku != current.sku {
            let key = (store, merged.sku.clone());
            if tables.skus.contains_key(&key) {
                return Err(sku_clash());
            }
            tables.skus.remove(&(store, current.sku.clone()));
            tables.skus.insert(key, id);
        }

        let product = tables.scoped_product_mut(store, id)?;
        product.name = merged.name;
        product.sku = merged.sku;
        product.reorder_point = merged.reorder_point;
        product.on_hand = merged.on_hand;
        product.max = merged.max;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete(&self, store: StoreId, id: ProductId) -> Result<(), RepositoryError> {
        let _row = self.lock_row(store, id).await?;
        let mut tables = self.tables();
        tables.scoped_product_mut(store, id)?;
        tables.remove_product(id);
        Ok(())
    }

    async fn sku_taken(&self, store: StoreId, sku: &str) -> Result<bool, RepositoryError> {
        Ok(self.tables().skus.contains_key(&(store, sku.to_owned())))
    }

    async fn adjust_on_hand(
        &self,
        store: StoreId,
        id: ProductId,
        delta: i32,
    ) -> Result<Product, RepositoryError> {
        let _row = self.lock_row(store, id).await?;
        let mut tables = self.tables();
        let product = tables.scoped_product_mut(store, id)?;

        product.on_hand = apply_delta(product.on_hand, delta)?;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }
}
