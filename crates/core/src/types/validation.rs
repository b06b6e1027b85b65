//! Field-level validation errors.
//!
//! Validation never stops at the first problem: every violated field is
//! collected so a form can highlight all of them at once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single violated field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Attribute name as it appears on the wire (e.g. `reorder_point`).
    pub field: String,
    /// Message without the attribute prefix (e.g. `can't be blank`).
    pub message: String,
}

impl FieldError {
    /// Human-readable message including the attribute name
    /// (`reorder_point` + `can't be blank` becomes `Reorder point can't be blank`).
    #[must_use]
    pub fn full_message(&self) -> String {
        format!("{} {}", humanize(&self.field), self.message)
    }
}

/// Collection of field errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("validation failed: {}", joined(.errors))]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

fn joined(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(FieldError::full_message)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationErrors {
    /// Create an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Convenience constructor for a single error.
    #[must_use]
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Record a violation.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_owned(),
            message: message.into(),
        });
    }

    /// Append all errors from another collection.
    pub fn merge(&mut self, other: Self) {
        self.errors.extend(other.errors);
    }

    /// Returns `true` when no field is violated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate the recorded errors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    /// Returns `true` if `field` has at least one error.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// Full messages in insertion order.
    #[must_use]
    pub fn full_messages(&self) -> Vec<String> {
        self.errors.iter().map(FieldError::full_message).collect()
    }

    /// Messages grouped by field.
    #[must_use]
    pub fn by_field(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for e in &self.errors {
            map.entry(e.field.clone()).or_default().push(e.message.clone());
        }
        map
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    ///
    /// # Errors
    ///
    /// Returns `self` if at least one field is violated.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

fn humanize(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
