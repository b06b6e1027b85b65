//! `PostgreSQL` repositories.
//!
//! Queries are checked at runtime (`sqlx::query_as`) and decoded into private
//! `FromRow` row structs before being converted into domain types, so the
//! workspace builds without a live database.

mod identities;
mod products;
mod stores;

pub use identities::PgIdentityRepository;
pub use products::PgProductRepository;
pub use stores::PgStoreRepository;

use stockroom_core::ValidationErrors;

use super::{RepositoryError, SKU_TAKEN};

/// `lock_not_available`, raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Map driver errors that carry domain meaning; everything else stays a
/// database error.
fn map_constraint_error(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE) {
            return RepositoryError::LockTimeout;
        }
        match db_err.constraint() {
            Some("products_store_id_sku_key") => {
                return RepositoryError::Invalid(ValidationErrors::single("sku", SKU_TAKEN));
            }
            Some("stores_slug_key") => {
                return RepositoryError::Invalid(ValidationErrors::single(
                    "slug",
                    "has already been taken",
                ));
            }
            Some("users_email_key") => {
                return RepositoryError::Conflict("email already exists".to_owned());
            }
            _ => {}
        }
        if db_err.is_foreign_key_violation() {
            return RepositoryError::Invalid(ValidationErrors::single("store", "must exist"));
        }
    }
    RepositoryError::Database(err)
}
