//! End-to-end tests for Stockroom.
//!
//! Each test boots its own server on an ephemeral port with the in-memory
//! backend, seeds it directly through [`AppState`], and then talks to it only
//! over HTTP through the dashboard client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p stockroom-integration-tests
//! ```
//!
//! No database or external service is needed.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc)]

use secrecy::SecretString;
use tokio::net::TcpListener;
use tower_sessions::MemoryStore;

use stockroom_core::{Product, ProductFields, Role};
use stockroom_dashboard::HttpInventoryClient;
use stockroom_server::config::ServerConfig;
use stockroom_server::db::{Backend, MemoryStorage};
use stockroom_server::models::{Identity, NewStore, Store};
use stockroom_server::services::NewAccount;
use stockroom_server::state::AppState;

/// Password given to every seeded user.
pub const PASSWORD: &str = "correct horse battery";

/// A running server and direct access to its storage for seeding.
pub struct TestServer {
    pub base_url: String,
    pub state: AppState,
}

impl TestServer {
    /// Start a server on `127.0.0.1` with an OS-assigned port.
    pub async fn spawn() -> Self {
        let state = AppState::new(
            ServerConfig::default(),
            Backend::Memory(MemoryStorage::new()),
        );
        let app = stockroom_server::app(state.clone(), MemoryStore::default());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Listener has no address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Test server failed");
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub async fn store(&self, name: &str, slug: &str) -> Store {
        self.state
            .stores()
            .create(NewStore::new(name, slug).expect("Invalid store"))
            .await
            .expect("Failed to create store")
    }

    /// Create a user in `store` with [`PASSWORD`].
    pub async fn user(&self, store: &Store, email: &str, role: Role) -> Identity {
        self.state
            .auth()
            .create_identity(NewAccount {
                store_id: store.id,
                email: email.to_string(),
                password: PASSWORD.to_string(),
                name: None,
                role,
            })
            .await
            .expect("Failed to create user")
    }

    /// Create a product in the owner's store.
    pub async fn product(&self, owner: &Identity, name: &str, sku: &str, on_hand: i32) -> Product {
        self.state
            .scope_for(owner)
            .products()
            .create(ProductFields {
                name: name.to_string(),
                sku: sku.to_string(),
                reorder_point: 2,
                on_hand,
                max: 50,
            })
            .await
            .expect("Failed to create product")
    }

    /// A client with no session.
    #[must_use]
    pub fn client(&self) -> HttpInventoryClient {
        HttpInventoryClient::new(&self.base_url).expect("Failed to build client")
    }

    /// A client signed in as `email`.
    pub async fn signed_in(&self, email: &str) -> HttpInventoryClient {
        let mut client = self.client();
        client
            .sign_in(email, &SecretString::from(PASSWORD))
            .await
            .expect("Sign-in failed");
        client
    }
}

/// Two stores with one admin and three products each.
pub struct TwoStores {
    pub server: TestServer,
    pub shop: Store,
    pub shop_admin: Identity,
    pub shop_products: Vec<Product>,
    pub other: Store,
    pub other_admin: Identity,
    pub other_products: Vec<Product>,
}

impl TwoStores {
    pub async fn seed() -> Self {
        let server = TestServer::spawn().await;

        let shop = server.store("Shop", "shop").await;
        let shop_admin = server.user(&shop, "admin@shop.com", Role::Admin).await;
        let mut shop_products = Vec::new();
        for (name, sku) in [("Anchor", "A-1"), ("Bolt", "B-1"), ("Clamp", "C-1")] {
            shop_products.push(server.product(&shop_admin, name, sku, 10).await);
        }

        let other = server.store("Other", "other").await;
        let other_admin = server.user(&other, "admin@other.com", Role::Admin).await;
        let mut other_products = Vec::new();
        for (name, sku) in [("Xylophone", "A-1"), ("Yoyo", "Y-1"), ("Zither", "Z-1")] {
            other_products.push(server.product(&other_admin, name, sku, 3).await);
        }

        Self {
            server,
            shop,
            shop_admin,
            shop_products,
            other,
            other_admin,
            other_products,
        }
    }
}
