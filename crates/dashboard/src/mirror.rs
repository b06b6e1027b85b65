//! Client mirror of the product list.
//!
//! The mirror is a reducer: every change arrives as a [`SyncEvent`] and
//! [`ClientMirror::apply`] is the only mutator. Started events only set
//! pending markers; products enter or leave the mirror solely on confirmed
//! server responses, and successful responses replace the local copy
//! wholesale.

use std::collections::HashMap;

use stockroom_core::{Product, ProductId};

use crate::status::Status;

pub const CREATED: &str = "Product created successfully.";
pub const UPDATED: &str = "Product updated.";
pub const ADJUSTED: &str = "Stock adjusted.";
pub const DELETED: &str = "Product deleted.";
pub const BULK_DELETED: &str = "Selected products deleted.";

/// What a product is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    Saving,
    Deleting,
}

/// Everything that can happen to the mirror.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Authoritative list fetched from the server.
    Loaded(Vec<Product>),
    /// An operation was refused before any request was sent.
    Rejected(String),
    CreateStarted,
    CreateSucceeded(Product),
    CreateFailed(String),
    UpdateStarted(ProductId),
    UpdateSucceeded(Product),
    UpdateFailed { id: ProductId, message: String },
    AdjustStarted(ProductId),
    AdjustSucceeded(Product),
    AdjustFailed { id: ProductId, message: String },
    DeleteStarted(ProductId),
    DeleteSucceeded(ProductId),
    DeleteFailed { id: ProductId, message: String },
    BulkDeleteStarted(Vec<ProductId>),
    BulkDeleteSucceeded(Vec<ProductId>),
    /// At least one delete failed. Some of `ids` may already be gone
    /// server-side, so the mirror is flagged stale.
    BulkDeleteFailed { ids: Vec<ProductId>, message: String },
}

/// The last confirmed product list plus pending markers.
#[derive(Debug, Default, Clone)]
pub struct ClientMirror {
    products: Vec<Product>,
    pending: HashMap<ProductId, Pending>,
    creating: usize,
    stale: bool,
}

impl ClientMirror {
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products,
            ..Self::default()
        }
    }

    /// Products in the order they were confirmed.
    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    #[must_use]
    pub fn get(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Products ordered by name, case-insensitively.
    #[must_use]
    pub fn sorted(&self) -> Vec<&Product> {
        let mut sorted: Vec<&Product> = self.products.iter().collect();
        sorted.sort_by_cached_key(|p| (p.name.to_lowercase(), p.name.clone(), p.id));
        sorted
    }

    /// Products at or below their reorder point.
    #[must_use]
    pub fn low_stock_count(&self) -> usize {
        self.products.iter().filter(|p| p.is_low_stock()).count()
    }

    #[must_use]
    pub fn pending(&self, id: ProductId) -> Option<Pending> {
        self.pending.get(&id).copied()
    }

    /// Whether a create request is in flight.
    #[must_use]
    pub const fn is_creating(&self) -> bool {
        self.creating > 0
    }

    /// Whether the mirror may disagree with the server and must be refetched.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.stale
    }

    /// Apply one event. Returns the status to show, if any.
    pub fn apply(&mut self, event: SyncEvent) -> Option<Status> {
        match event {
            SyncEvent::Loaded(products) => {
                self.products = products;
                self.stale = false;
                None
            }
            SyncEvent::Rejected(message) => Some(Status::critical(message)),
            SyncEvent::CreateStarted => {
                self.creating += 1;
                None
            }
            SyncEvent::CreateSucceeded(product) => {
                self.creating = self.creating.saturating_sub(1);
                self.upsert(product);
                Some(Status::success(CREATED))
            }
            SyncEvent::CreateFailed(message) => {
                self.creating = self.creating.saturating_sub(1);
                Some(Status::critical(message))
            }
            SyncEvent::UpdateStarted(id) | SyncEvent::AdjustStarted(id) => {
                self.pending.insert(id, Pending::Saving);
                None
            }
            SyncEvent::UpdateSucceeded(product) => {
                self.pending.remove(&product.id);
                self.upsert(product);
                Some(Status::success(UPDATED))
            }
            SyncEvent::AdjustSucceeded(product) => {
                self.pending.remove(&product.id);
                self.upsert(product);
                Some(Status::success(ADJUSTED))
            }
            SyncEvent::UpdateFailed { id, message }
            | SyncEvent::AdjustFailed { id, message }
            | SyncEvent::DeleteFailed { id, message } => {
                self.pending.remove(&id);
                Some(Status::critical(message))
            }
            SyncEvent::DeleteStarted(id) => {
                self.pending.insert(id, Pending::Deleting);
                None
            }
            SyncEvent::DeleteSucceeded(id) => {
                self.pending.remove(&id);
                self.products.retain(|p| p.id != id);
                Some(Status::success(DELETED))
            }
            SyncEvent::BulkDeleteStarted(ids) => {
                for id in ids {
                    self.pending.insert(id, Pending::Deleting);
                }
                None
            }
            SyncEvent::BulkDeleteSucceeded(ids) => {
                for id in &ids {
                    self.pending.remove(id);
                }
                self.products.retain(|p| !ids.contains(&p.id));
                Some(Status::success(BULK_DELETED))
            }
            SyncEvent::BulkDeleteFailed { ids, message } => {
                for id in &ids {
                    self.pending.remove(id);
                }
                self.stale = true;
                Some(Status::critical(message))
            }
        }
    }

    /// Replace the entry with the same id, or append.
    fn upsert(&mut self, product: Product) {
        match self.products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product,
            None => self.products.push(product),
        }
    }
}
