//! Stockroom Core - Shared domain types.
//!
//! This crate provides the types shared by every Stockroom component:
//! - `server` - Authenticated, store-scoped inventory HTTP service
//! - `dashboard` - Client-side synchronization engine for the product list
//! - `cli` - Operator tooling for migrations, stores, and users
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no HTTP clients. Both the server and the dashboard depend on it so
//! that the product wire format has exactly one definition.
//!
//! # Modules
//!
//! - [`types`] - Typed ids, emails, roles, products and validation errors

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
