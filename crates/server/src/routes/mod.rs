//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /                         - Redirect to /products
//!
//! # Session
//! GET    /session/new              - Sign-in page
//! POST   /session                  - Sign in (303 to /products, 422 on failure)
//! GET    /session                  - Current identity + CSRF token (JSON)
//! DELETE /session                  - Sign out (idempotent)
//!
//! # Registration
//! GET    /registrations/new        - Sign-up page
//! POST   /registrations            - Sign up (always an employee)
//!
//! # Products (authenticated, CSRF-checked when mutating)
//! GET    /products                 - List (JSON or page)
//! POST   /products                 - Create (201)
//! PATCH  /products/{id}            - Partial update
//! DELETE /products/{id}            - Delete (204)
//! POST   /products/{id}/adjustments - Adjust on-hand stock by a delta
//! ```

pub mod extract;
pub mod products;
pub mod registrations;
pub mod session;

pub use extract::{JsonOrForm, ProductBody};

use axum::{
    Router,
    middleware::from_fn,
    response::Redirect,
    routing::{get, patch, post},
};

use crate::middleware::verify_authenticity_token;
use crate::state::AppState;

/// All application routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { Redirect::to("/products") }))
        .route("/session/new", get(session::new))
        .route(
            "/session",
            get(session::show)
                .post(session::create)
                .delete(session::destroy),
        )
        .route("/registrations/new", get(registrations::new))
        .route("/registrations", post(registrations::create))
        .merge(product_routes())
}

/// Product routes. The forgery check runs before any handler extractor.
fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(products::index).post(products::create))
        .route(
            "/products/{id}",
            patch(products::update).delete(products::destroy),
        )
        .route("/products/{id}/adjustments", post(products::adjust))
        .route_layer(from_fn(verify_authenticity_token))
}
