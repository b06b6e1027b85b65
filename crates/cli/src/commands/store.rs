//! Store (tenant) management.
//!
//! ```bash
//! stockroom store create --name "Corner Shop" --slug corner-shop
//! stockroom store list
//! stockroom store delete corner-shop
//! ```

use stockroom_server::db::StoreRepository;
use stockroom_server::db::postgres::PgStoreRepository;
use stockroom_server::models::{NewStore, Store};

use super::{CommandError, connect};

/// Create a store and return it.
pub async fn create(name: &str, slug: &str) -> Result<Store, CommandError> {
    let new_store = NewStore::new(name, slug)?;
    let stores = PgStoreRepository::new(connect().await?);

    let store = stores.create(new_store).await?;
    tracing::info!(store_id = %store.id, slug = %store.slug, "Store created");
    Ok(store)
}

/// All stores ordered by name.
pub async fn list() -> Result<Vec<Store>, CommandError> {
    let stores = PgStoreRepository::new(connect().await?);
    Ok(stores.list().await?)
}

/// Delete a store with its users and products.
pub async fn delete(slug: &str) -> Result<(), CommandError> {
    let stores = PgStoreRepository::new(connect().await?);
    let store = stores
        .find_by_slug(slug)
        .await?
        .ok_or_else(|| CommandError::UnknownStore(slug.to_owned()))?;

    stores.delete(store.id).await?;
    tracing::warn!(store_id = %store.id, slug, "Store deleted with its users and products");
    Ok(())
}
