//! Store-scoped access to products.
//!
//! A [`StoreScope`] is the only way request code reaches the product
//! repository. Its store id is private and can only be derived from an
//! authenticated [`Identity`], so no request input can name another store.
//! A product id from another store therefore behaves exactly like an id that
//! does not exist.

use std::sync::Arc;

use stockroom_core::{Product, ProductFields, ProductId, ProductPatch, StoreId};

use crate::db::{ProductRepository, RepositoryError, SKU_TAKEN};
use crate::models::Identity;

/// Capability to act on one store's products.
#[derive(Clone)]
pub struct StoreScope {
    store_id: StoreId,
    products: Arc<dyn ProductRepository>,
}

impl std::fmt::Debug for StoreScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreScope")
            .field("store_id", &self.store_id)
            .finish_non_exhaustive()
    }
}

impl StoreScope {
    /// Derive the scope of an authenticated identity.
    #[must_use]
    pub fn for_identity(identity: &Identity, products: Arc<dyn ProductRepository>) -> Self {
        Self {
            store_id: identity.store_id,
            products,
        }
    }

    /// The store this scope is bound to.
    #[must_use]
    pub const fn store_id(&self) -> StoreId {
        self.store_id
    }

    /// Product operations bound to this scope's store.
    #[must_use]
    pub const fn products(&self) -> ScopedProducts<'_> {
        ScopedProducts { scope: self }
    }
}

/// Product operations of a [`StoreScope`].
pub struct ScopedProducts<'a> {
    scope: &'a StoreScope,
}

impl ScopedProducts<'_> {
    /// Products ordered by name, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if storage fails.
    pub async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        self.scope.products.list(self.scope.store_id).await
    }

    /// Validate and create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Invalid` with every violated field, including
    /// a SKU already used in this store.
    pub async fn create(&self, fields: ProductFields) -> Result<Product, RepositoryError> {
        let sku = fields.sku.trim().to_owned();
        match fields.normalized() {
            Ok(fields) => self.scope.products.create(self.scope.store_id, fields).await,
            Err(mut errors) => {
                let store = self.scope.store_id;
                if !sku.is_empty() && self.scope.products.sku_taken(store, &sku).await? {
                    errors.add("sku", SKU_TAKEN);
                }
                Err(RepositoryError::Invalid(errors))
            }
        }
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is not in this store,
    /// or `RepositoryError::Invalid` if the merged record is invalid.
    pub async fn update(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RepositoryError> {
        retry_lock_timeout_once(|| self.scope.products.update(self.scope.store_id, id, patch))
            .await
    }

    /// Permanently remove a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is not in this store.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        retry_lock_timeout_once(|| self.scope.products.delete(self.scope.store_id, id)).await
    }

    /// Adjust on-hand stock by `delta` under the product's row lock.
    ///
    /// A lock timeout is retried once before it is reported.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is not in this store,
    /// `RepositoryError::Invalid` if stock would go negative, or
    /// `RepositoryError::LockTimeout` if both attempts timed out.
    pub async fn adjust_on_hand(
        &self,
        id: ProductId,
        delta: i32,
    ) -> Result<Product, RepositoryError> {
        retry_lock_timeout_once(|| {
            self.scope
                .products
                .adjust_on_hand(self.scope.store_id, id, delta)
        })
        .await
    }
}

async fn retry_lock_timeout_once<T, F, Fut>(mut attempt: F) -> Result<T, RepositoryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RepositoryError>>,
{
    match attempt().await {
        Err(RepositoryError::LockTimeout) => {
            tracing::warn!("row lock timed out, retrying once");
            attempt().await
        }
        other => other,
    }
}
