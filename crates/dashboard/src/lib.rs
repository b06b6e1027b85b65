//! Stockroom Dashboard - client-side synchronization for the product list.
//!
//! The products page bootstraps the store's product list; from then on the
//! dashboard keeps a [`ClientMirror`] in step with the server:
//!
//! - [`mirror`] - the mirror as a reducer over [`SyncEvent`]s
//! - [`status`] - the auto-expiring status banner
//! - [`engine`] - [`DashboardSync`], which issues requests and applies results
//! - [`client`] - the [`InventoryApi`] seam and its HTTP implementation
//!
//! The mirror only ever reflects confirmed server responses. A bulk delete
//! that fails part-way leaves it unchanged and marked stale; the next
//! operation refetches the authoritative list first.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod client;
pub mod engine;
pub mod error;
pub mod mirror;
pub mod status;

pub use client::{HttpInventoryClient, InventoryApi, SessionInfo, SessionUser, SignUp};
pub use engine::{DashboardSync, MAX_IN_FLIGHT_DELETES, Selection};
pub use error::{ApiError, SyncError};
pub use mirror::{ClientMirror, Pending, SyncEvent};
pub use status::{STATUS_TTL, Status, StatusBanner, Tone};
