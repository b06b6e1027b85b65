//! Core types for Stockroom.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod product;
pub mod role;
pub mod validation;

pub use email::{Email, EmailError};
pub use id::*;
pub use product::{Product, ProductFields, ProductPatch, StockLevel};
pub use role::Role;
pub use validation::{FieldError, ValidationErrors};
