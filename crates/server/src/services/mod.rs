//! Business logic services.

pub mod auth;
pub mod session;

pub use auth::{AuthError, AuthService, NewAccount, Registration};
pub use session::{CsrfToken, SessionError};
