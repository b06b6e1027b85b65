//! Product records and their input shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ProductId, StoreId};
use super::validation::ValidationErrors;

const BLANK: &str = "can't be blank";
const NEGATIVE: &str = "must be greater than or equal to 0";

/// A product as stored by the server.
///
/// `store_id` is fixed at creation; every other attribute can be replaced by
/// an update, and `on_hand` can additionally be moved by a stock adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub store_id: StoreId,
    pub name: String,
    pub sku: String,
    pub reorder_point: i32,
    pub on_hand: i32,
    pub max: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether the product should show up in the low-stock summary.
    #[must_use]
    pub const fn is_low_stock(&self) -> bool {
        self.on_hand <= self.reorder_point
    }

    /// Gauge values for rendering the stock bar.
    #[must_use]
    pub fn stock_level(&self) -> StockLevel {
        StockLevel::new(self.on_hand, self.reorder_point, self.max)
    }

    /// The editable attributes of this product.
    #[must_use]
    pub fn fields(&self) -> ProductFields {
        ProductFields {
            name: self.name.clone(),
            sku: self.sku.clone(),
            reorder_point: self.reorder_point,
            on_hand: self.on_hand,
            max: self.max,
        }
    }
}

/// Full set of editable product attributes (create, or full replace).
///
/// Missing counters default to zero, matching the column defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductFields {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub reorder_point: i32,
    #[serde(default)]
    pub on_hand: i32,
    #[serde(default)]
    pub max: i32,
}

impl ProductFields {
    /// Trim text fields and check every constraint that does not need storage.
    ///
    /// SKU uniqueness is checked by the repository.
    ///
    /// # Errors
    ///
    /// Returns every violated field.
    pub fn normalized(self) -> Result<Self, ValidationErrors> {
        let fields = Self {
            name: self.name.trim().to_owned(),
            sku: self.sku.trim().to_owned(),
            ..self
        };

        let mut errors = ValidationErrors::new();
        if fields.name.is_empty() {
            errors.add("name", BLANK);
        }
        if fields.sku.is_empty() {
            errors.add("sku", BLANK);
        }
        check_counter(&mut errors, "reorder_point", fields.reorder_point);
        check_counter(&mut errors, "on_hand", fields.on_hand);
        check_counter(&mut errors, "max", fields.max);

        errors.into_result().map(|()| fields)
    }
}

/// Partial update: only the attributes present are changed.
///
/// Unknown keys in the request body are ignored by serde, so only the five
/// recognised attributes can ever reach storage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reorder_point: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_hand: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i32>,
}

impl ProductPatch {
    /// Merge the patch over `current` and validate the result.
    ///
    /// # Errors
    ///
    /// Returns every violated field of the merged record.
    pub fn apply_to(&self, current: &ProductFields) -> Result<ProductFields, ValidationErrors> {
        ProductFields {
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            sku: self.sku.clone().unwrap_or_else(|| current.sku.clone()),
            reorder_point: self.reorder_point.unwrap_or(current.reorder_point),
            on_hand: self.on_hand.unwrap_or(current.on_hand),
            max: self.max.unwrap_or(current.max),
        }
        .normalized()
    }
}

impl From<ProductFields> for ProductPatch {
    fn from(fields: ProductFields) -> Self {
        Self {
            name: Some(fields.name),
            sku: Some(fields.sku),
            reorder_point: Some(fields.reorder_point),
            on_hand: Some(fields.on_hand),
            max: Some(fields.max),
        }
    }
}

fn check_counter(errors: &mut ValidationErrors, field: &str, value: i32) {
    if value < 0 {
        errors.add(field, NEGATIVE);
    }
}

/// Stock gauge derived from a product's counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StockLevel {
    /// Upper bound of the gauge: `max` when set, otherwise the larger of
    /// `on_hand`, `reorder_point` and 1.
    pub scale_max: i32,
    /// On-hand as a percentage of `scale_max`, capped at 100.
    pub fill_percent: f64,
    /// Reorder marker position as a percentage, if a reorder point is set.
    pub reorder_percent: Option<f64>,
    /// On-hand is strictly below a non-zero reorder point.
    pub below_reorder_point: bool,
    /// On-hand exceeds a non-zero max capacity.
    pub over_capacity: bool,
    /// How far on-hand exceeds max (0 when within capacity).
    pub over_by: i32,
}

impl StockLevel {
    /// Compute the gauge. Negative inputs are treated as zero.
    #[must_use]
    pub fn new(on_hand: i32, reorder_point: i32, max: i32) -> Self {
        let on_hand = on_hand.max(0);
        let reorder_point = reorder_point.max(0);
        let max = max.max(0);

        let scale_max = if max > 0 {
            max
        } else {
            on_hand.max(reorder_point).max(1)
        };
        let percent = |value: i32| (f64::from(value) / f64::from(scale_max) * 100.0).min(100.0);

        Self {
            scale_max,
            fill_percent: percent(on_hand),
            reorder_percent: (reorder_point > 0).then(|| percent(reorder_point)),
            below_reorder_point: reorder_point > 0 && on_hand < reorder_point,
            over_capacity: max > 0 && on_hand > max,
            over_by: if max > 0 { (on_hand - max).max(0) } else { 0 },
        }
    }
}
