//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (recorded on the span and Sentry scope)
//! 4. Session layer (tower-sessions)
//! 5. Forgery protection (route layer on product routes)
//! 6. Auth extractors (`RequireAuth`, `Scoped`) in handlers

pub mod auth;
pub mod csrf;
pub mod request_id;
pub mod session;

pub use auth::{AuthRejection, CSRF_HEADER, RequireAuth, Scoped, wants_json};
pub use csrf::verify_authenticity_token;
pub use request_id::request_id_middleware;
pub use session::{SESSION_COOKIE_NAME, create_session_layer};
