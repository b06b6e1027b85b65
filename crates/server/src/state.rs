//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::db::{Backend, IdentityRepository, Repositories, StoreRepository};
use crate::models::Identity;
use crate::scope::StoreScope;
use crate::services::AuthService;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Product access is deliberately not exposed:
/// handlers reach products only through [`AppState::scope_for`].
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    backend: Backend,
    repos: Repositories,
}

impl AppState {
    /// Create a new application state over `backend`.
    #[must_use]
    pub fn new(config: ServerConfig, backend: Backend) -> Self {
        let repos = backend.repositories(config.lock_timeout);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                repos,
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the storage backend.
    #[must_use]
    pub fn backend(&self) -> &Backend {
        &self.inner.backend
    }

    #[must_use]
    pub fn stores(&self) -> &dyn StoreRepository {
        self.inner.repos.stores.as_ref()
    }

    #[must_use]
    pub fn identities(&self) -> &dyn IdentityRepository {
        self.inner.repos.identities.as_ref()
    }

    /// Credential verifier and identity creation over this state's storage.
    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(self.identities(), self.stores())
    }

    /// The product scope an authenticated identity may act on.
    #[must_use]
    pub fn scope_for(&self, identity: &Identity) -> StoreScope {
        StoreScope::for_identity(identity, Arc::clone(&self.inner.repos.products))
    }
}
