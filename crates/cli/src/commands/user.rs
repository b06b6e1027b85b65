//! User management: the only way to create an `admin` identity.
//!
//! ```bash
//! stockroom user create --store corner-shop --email owner@shop.com \
//!     --password 'correct horse battery' --role admin --name "Owner"
//! ```

use secrecy::{ExposeSecret, SecretString};

use stockroom_core::Role;
use stockroom_server::db::StoreRepository;
use stockroom_server::db::postgres::{PgIdentityRepository, PgStoreRepository};
use stockroom_server::models::Identity;
use stockroom_server::services::{AuthService, NewAccount};

use super::{CommandError, connect};

/// Create a user bound to the store with `store_slug`.
pub async fn create(
    store_slug: &str,
    email: &str,
    password: &SecretString,
    role: &str,
    name: Option<String>,
) -> Result<Identity, CommandError> {
    let role: Role = role
        .parse()
        .map_err(|_| CommandError::InvalidRole(role.to_owned()))?;

    let pool = connect().await?;
    let stores = PgStoreRepository::new(pool.clone());
    let identities = PgIdentityRepository::new(pool);

    let store = stores
        .find_by_slug(store_slug)
        .await?
        .ok_or_else(|| CommandError::UnknownStore(store_slug.to_owned()))?;

    let identity = AuthService::new(&identities, &stores)
        .create_identity(NewAccount {
            store_id: store.id,
            email: email.to_owned(),
            password: password.expose_secret().to_owned(),
            name,
            role,
        })
        .await?;

    tracing::info!(
        user_id = %identity.id,
        email = %identity.email,
        role = %identity.role,
        store = %store.slug,
        "User created"
    );
    Ok(identity)
}
