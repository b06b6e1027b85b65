//! Server-side domain models.

pub mod identity;
pub mod session;
pub mod store;

pub use identity::{Identity, NewIdentity};
pub use session::{SessionUser, session_keys};
pub use store::{NewStore, Store};
