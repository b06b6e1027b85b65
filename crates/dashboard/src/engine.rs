//! Dashboard synchronization engine.
//!
//! [`DashboardSync`] issues requests through an [`InventoryApi`] and feeds
//! every outcome into the [`ClientMirror`] reducer. Each operation:
//!
//! 1. refetches the list first if a failed bulk delete left it stale,
//! 2. refuses to start while another operation holds the same product,
//! 3. applies the server's response, never the values it submitted.
//!
//! Responses that resolve after [`DashboardSync::unmount`] are discarded.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::{StreamExt, stream};
use tracing::{debug, instrument, warn};

use stockroom_core::{Product, ProductFields, ProductId, ProductPatch};

use crate::client::InventoryApi;
use crate::error::{ApiError, SyncError};
use crate::mirror::{ClientMirror, SyncEvent};
use crate::status::{Status, StatusBanner};

/// Upper bound on concurrent delete requests during a bulk delete.
pub const MAX_IN_FLIGHT_DELETES: usize = 8;

pub const NAME_AND_SKU_REQUIRED: &str = "Name and SKU are required.";
const SAVE_FAILED: &str = "Unable to save the product. Please try again.";
const DELETE_FAILED: &str = "Unable to delete the product right now.";
const BULK_DELETE_FAILED: &str = "Unable to delete the selected products.";
const ADJUST_FAILED: &str = "Unable to adjust stock right now.";
const LOAD_FAILED: &str = "Unable to load products.";

/// Which products a bulk delete targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Ids(Vec<ProductId>),
    /// Every product in the mirror, in display order.
    All,
}

#[derive(Debug, Default)]
struct EngineState {
    mirror: ClientMirror,
    banner: StatusBanner,
}

impl EngineState {
    fn apply(&mut self, event: SyncEvent) {
        if let Some(status) = self.mirror.apply(event) {
            self.banner.show(status, Instant::now());
        }
    }
}

/// Drives the client mirror from user actions.
pub struct DashboardSync<A> {
    api: A,
    state: Mutex<EngineState>,
    mounted: AtomicBool,
}

impl<A: InventoryApi> DashboardSync<A> {
    /// Start with the product list bootstrapped into the page.
    pub fn new(api: A, products: Vec<Product>) -> Self {
        Self {
            api,
            state: Mutex::new(EngineState {
                mirror: ClientMirror::new(products),
                banner: StatusBanner::default(),
            }),
            mounted: AtomicBool::new(true),
        }
    }

    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Read the mirror.
    pub fn with_mirror<R>(&self, f: impl FnOnce(&ClientMirror) -> R) -> R {
        f(&self.state().mirror)
    }

    /// The banner status visible at `now`.
    pub fn status(&self, now: Instant) -> Option<Status> {
        self.state().banner.current(now).cloned()
    }

    pub fn dismiss_status(&self) {
        self.state().banner.dismiss();
    }

    /// Stop applying results. Requests already in flight still complete
    /// server-side.
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Replace the mirror with the server's list.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Api` if the list cannot be fetched.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), SyncError> {
        self.ensure_mounted()?;
        match self.api.list().await {
            Ok(products) => {
                debug!(count = products.len(), "product list loaded");
                self.dispatch(SyncEvent::Loaded(products))
            }
            Err(err) => {
                self.dispatch(SyncEvent::Rejected(err.message_or(LOAD_FAILED)))?;
                Err(err.into())
            }
        }
    }

    /// Refetch if the mirror may disagree with the server.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Api` if the refetch fails.
    pub async fn ensure_fresh(&self) -> Result<(), SyncError> {
        if self.with_mirror(ClientMirror::is_stale) {
            warn!("mirror is stale, refetching before the next operation");
            self.refresh().await?;
        }
        Ok(())
    }

    /// Create a product. It enters the mirror only once the server confirms.
    ///
    /// # Errors
    ///
    /// `SyncError::Invalid` for a blank name or SKU (no request is sent),
    /// `SyncError::Api` if the server refuses.
    #[instrument(skip_all)]
    pub async fn create(&self, fields: ProductFields) -> Result<Product, SyncError> {
        self.ensure_mounted()?;
        self.require_name_and_sku(&fields)?;
        self.ensure_fresh().await?;

        self.dispatch(SyncEvent::CreateStarted)?;
        match self.api.create(&fields).await {
            Ok(product) => {
                self.dispatch(SyncEvent::CreateSucceeded(product.clone()))?;
                Ok(product)
            }
            Err(err) => {
                self.dispatch(SyncEvent::CreateFailed(err.message_or(SAVE_FAILED)))?;
                Err(err.into())
            }
        }
    }

    /// Replace every editable attribute of a product.
    ///
    /// # Errors
    ///
    /// `SyncError::Invalid` for a blank name or SKU, `SyncError::Busy` while
    /// the product has an operation in flight, `SyncError::Api` if the server
    /// refuses.
    #[instrument(skip(self, fields))]
    pub async fn update(&self, id: ProductId, fields: ProductFields) -> Result<Product, SyncError> {
        self.ensure_mounted()?;
        self.require_name_and_sku(&fields)?;
        self.ensure_fresh().await?;

        self.begin(&[id], SyncEvent::UpdateStarted(id))?;
        match self.api.update(id, &ProductPatch::from(fields)).await {
            Ok(product) => {
                self.dispatch(SyncEvent::UpdateSucceeded(product.clone()))?;
                Ok(product)
            }
            Err(err) => {
                let message = err.message_or(SAVE_FAILED);
                self.dispatch(SyncEvent::UpdateFailed { id, message })?;
                Err(err.into())
            }
        }
    }

    /// Move `on_hand` by `delta` on the server.
    ///
    /// # Errors
    ///
    /// `SyncError::Busy` while the product has an operation in flight,
    /// `SyncError::Api` if the server refuses or the product stays locked.
    #[instrument(skip(self))]
    pub async fn adjust(&self, id: ProductId, delta: i32) -> Result<Product, SyncError> {
        self.ensure_mounted()?;
        self.ensure_fresh().await?;

        self.begin(&[id], SyncEvent::AdjustStarted(id))?;
        match self.api.adjust(id, delta).await {
            Ok(product) => {
                self.dispatch(SyncEvent::AdjustSucceeded(product.clone()))?;
                Ok(product)
            }
            Err(err) => {
                let message = err.message_or(ADJUST_FAILED);
                self.dispatch(SyncEvent::AdjustFailed { id, message })?;
                Err(err.into())
            }
        }
    }

    /// Delete one product after `confirm` accepts the prompt.
    ///
    /// # Errors
    ///
    /// `SyncError::Cancelled` if the prompt is declined, `SyncError::Busy`
    /// while the product has an operation in flight, `SyncError::Api` if the
    /// product is unknown or the server refuses.
    #[instrument(skip(self, confirm))]
    pub async fn delete(
        &self,
        id: ProductId,
        confirm: impl FnOnce(&str) -> bool + Send,
    ) -> Result<(), SyncError> {
        self.ensure_mounted()?;
        self.ensure_fresh().await?;

        let name = self
            .with_mirror(|mirror| mirror.get(id).map(|p| p.name.clone()))
            .ok_or(SyncError::Api(ApiError::NotFound))?;
        if !confirm(&format!("Delete {name}? This cannot be undone.")) {
            return Err(SyncError::Cancelled);
        }

        self.begin(&[id], SyncEvent::DeleteStarted(id))?;
        match self.api.delete(id).await {
            Ok(()) => self.dispatch(SyncEvent::DeleteSucceeded(id)),
            Err(err) => {
                let message = err.message_or(DELETE_FAILED);
                self.dispatch(SyncEvent::DeleteFailed { id, message })?;
                Err(err.into())
            }
        }
    }

    /// Delete every selected product, at most [`MAX_IN_FLIGHT_DELETES`] at a
    /// time. Returns how many were deleted.
    ///
    /// The mirror changes only if every delete succeeds. On any failure the
    /// first error in selection order is surfaced and the mirror is marked
    /// stale, since some deletes may already have committed.
    ///
    /// # Errors
    ///
    /// `SyncError::Cancelled` if the prompt is declined, `SyncError::Busy`
    /// if a selected product has an operation in flight, `SyncError::Api`
    /// with the first failure.
    #[instrument(skip(self, confirm))]
    pub async fn bulk_delete(
        &self,
        selection: Selection,
        confirm: impl FnOnce(&str) -> bool + Send,
    ) -> Result<usize, SyncError> {
        self.ensure_mounted()?;
        self.ensure_fresh().await?;

        let ids: Vec<ProductId> = match selection {
            Selection::Ids(ids) => {
                let mut seen = HashSet::new();
                ids.into_iter().filter(|id| seen.insert(*id)).collect()
            }
            Selection::All => {
                self.with_mirror(|mirror| mirror.sorted().iter().map(|p| p.id).collect::<Vec<_>>())
            }
        };
        if ids.is_empty() {
            return Ok(0);
        }

        let prompt = if ids.len() == 1 {
            "Delete the selected product?".to_string()
        } else {
            format!("Delete {} products? This cannot be undone.", ids.len())
        };
        if !confirm(&prompt) {
            return Err(SyncError::Cancelled);
        }

        self.begin(&ids, SyncEvent::BulkDeleteStarted(ids.clone()))?;
        let results: Vec<Result<(), ApiError>> = stream::iter(ids.iter().copied())
            .map(|id| self.api.delete(id))
            .buffered(MAX_IN_FLIGHT_DELETES)
            .collect()
            .await;

        match results.into_iter().find_map(Result::err) {
            None => {
                let count = ids.len();
                self.dispatch(SyncEvent::BulkDeleteSucceeded(ids))?;
                Ok(count)
            }
            Some(err) => {
                warn!(error = %err, "bulk delete failed, mirror left unchanged");
                let message = err.message_or(BULK_DELETE_FAILED);
                self.dispatch(SyncEvent::BulkDeleteFailed { ids, message })?;
                Err(err.into())
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_mounted(&self) -> Result<(), SyncError> {
        if self.is_mounted() {
            Ok(())
        } else {
            Err(SyncError::Unmounted)
        }
    }

    /// Apply `event` unless the dashboard has been unmounted.
    fn dispatch(&self, event: SyncEvent) -> Result<(), SyncError> {
        self.ensure_mounted()?;
        self.state().apply(event);
        Ok(())
    }

    /// Claim `ids` and apply the started event under one lock.
    fn begin(&self, ids: &[ProductId], started: SyncEvent) -> Result<(), SyncError> {
        self.ensure_mounted()?;
        let mut state = self.state();
        if let Some(&busy) = ids.iter().find(|id| state.mirror.pending(**id).is_some()) {
            return Err(SyncError::Busy(busy));
        }
        state.apply(started);
        Ok(())
    }

    fn require_name_and_sku(&self, fields: &ProductFields) -> Result<(), SyncError> {
        if fields.name.trim().is_empty() || fields.sku.trim().is_empty() {
            self.dispatch(SyncEvent::Rejected(NAME_AND_SKU_REQUIRED.to_string()))?;
            return Err(SyncError::Invalid(NAME_AND_SKU_REQUIRED.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::Utc;
    use stockroom_core::StoreId;
    use tokio::sync::Notify;

    use super::*;
    use crate::mirror::{BULK_DELETED, CREATED, DELETED, Pending};
    use crate::status::Tone;

    fn product(id: i32, name: &str, on_hand: i32) -> Product {
        Product {
            id: ProductId::new(id),
            store_id: StoreId::new(1),
            name: name.to_string(),
            sku: format!("SKU-{id}"),
            reorder_point: 2,
            on_hand,
            max: 50,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn fields(name: &str, sku: &str) -> ProductFields {
        ProductFields {
            name: name.to_string(),
            sku: sku.to_string(),
            reorder_point: 1,
            on_hand: 4,
            max: 10,
        }
    }

    /// In-process server double.
    #[derive(Default)]
    struct FakeApi {
        products: Mutex<Vec<Product>>,
        failing_deletes: Vec<ProductId>,
        gate: Option<Arc<Notify>>,
        requests: AtomicUsize,
        lists: AtomicUsize,
    }

    impl FakeApi {
        fn with(products: Vec<Product>) -> Self {
            Self {
                products: Mutex::new(products),
                ..Self::default()
            }
        }

        fn stored(&self) -> Vec<Product> {
            self.products.lock().unwrap().clone()
        }

        async fn wait_for_gate(&self) {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
        }
    }

    #[async_trait]
    impl InventoryApi for FakeApi {
        async fn list(&self) -> Result<Vec<Product>, ApiError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            Ok(self.stored())
        }

        async fn create(&self, fields: &ProductFields) -> Result<Product, ApiError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.wait_for_gate().await;
            let mut products = self.products.lock().unwrap();
            if products.iter().any(|p| p.sku == fields.sku) {
                return Err(ApiError::Validation(vec![
                    "Sku has already been taken".to_string(),
                ]));
            }
            let id = products.iter().map(|p| p.id.as_i32()).max().unwrap_or(0) + 1;
            let mut created = product(id, fields.name.trim(), fields.on_hand);
            created.sku = fields.sku.trim().to_string();
            products.push(created.clone());
            Ok(created)
        }

        async fn update(&self, id: ProductId, patch: &ProductPatch) -> Result<Product, ApiError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let mut products = self.products.lock().unwrap();
            let stored = products
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(ApiError::NotFound)?;
            let merged = patch
                .apply_to(&stored.fields())
                .map_err(|errors| ApiError::Validation(errors.full_messages()))?;
            stored.name = merged.name;
            // Server canonicalizes SKUs.
            stored.sku = merged.sku.to_uppercase();
            stored.on_hand = merged.on_hand;
            Ok(stored.clone())
        }

        async fn delete(&self, id: ProductId) -> Result<(), ApiError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.wait_for_gate().await;
            if self.failing_deletes.contains(&id) {
                return Err(ApiError::NotFound);
            }
            let mut products = self.products.lock().unwrap();
            let before = products.len();
            products.retain(|p| p.id != id);
            if products.len() == before {
                Err(ApiError::NotFound)
            } else {
                Ok(())
            }
        }

        async fn adjust(&self, id: ProductId, delta: i32) -> Result<Product, ApiError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let mut products = self.products.lock().unwrap();
            let stored = products
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(ApiError::NotFound)?;
            stored.on_hand += delta;
            Ok(stored.clone())
        }
    }

    fn seeded() -> Vec<Product> {
        vec![product(1, "Anchor", 5), product(2, "bolt", 1), product(3, "Clamp", 9)]
    }

    fn message(sync: &DashboardSync<FakeApi>) -> Option<String> {
        sync.status(Instant::now()).map(|s| s.message)
    }

    #[tokio::test]
    async fn test_create_requires_name_and_sku_without_request() {
        let sync = DashboardSync::new(FakeApi::default(), Vec::new());

        let err = sync.create(fields("  ", "SKU-9")).await.unwrap_err();

        assert!(matches!(err, SyncError::Invalid(m) if m == NAME_AND_SKU_REQUIRED));
        assert_eq!(sync.api().requests.load(Ordering::SeqCst), 0);
        let status = sync.status(Instant::now()).unwrap();
        assert_eq!(status.tone, Tone::Critical);
        assert_eq!(status.message, NAME_AND_SKU_REQUIRED);
    }

    #[tokio::test]
    async fn test_create_inserts_server_record() {
        let sync = DashboardSync::new(FakeApi::default(), Vec::new());

        let created = sync.create(fields(" Widget ", "W-1")).await.unwrap();

        assert_eq!(created.name, "Widget");
        sync.with_mirror(|mirror| {
            assert_eq!(mirror.products(), &[created.clone()]);
            assert!(!mirror.is_creating());
        });
        assert_eq!(message(&sync).as_deref(), Some(CREATED));
    }

    #[tokio::test]
    async fn test_create_failure_leaves_mirror_untouched() {
        let sync = DashboardSync::new(FakeApi::with(seeded()), seeded());

        let err = sync.create(fields("Dup", "SKU-1")).await.unwrap_err();

        assert!(matches!(err, SyncError::Api(ApiError::Validation(_))));
        assert_eq!(sync.with_mirror(|m| m.products().len()), 3);
        assert_eq!(message(&sync).as_deref(), Some("Sku has already been taken"));
    }

    #[tokio::test]
    async fn test_update_applies_server_response() {
        let sync = DashboardSync::new(FakeApi::with(seeded()), seeded());

        sync.update(ProductId::new(2), fields("Bolt", "bolt-7"))
            .await
            .unwrap();

        let stored = sync.with_mirror(|m| m.get(ProductId::new(2)).cloned()).unwrap();
        assert_eq!(stored.sku, "BOLT-7");
        assert_eq!(sync.with_mirror(|m| m.pending(ProductId::new(2))), None);
    }

    #[tokio::test]
    async fn test_declined_delete_sends_nothing() {
        let sync = DashboardSync::new(FakeApi::with(seeded()), seeded());
        let mut prompt = String::new();

        let err = sync
            .delete(ProductId::new(1), |p| {
                prompt = p.to_string();
                false
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Cancelled));
        assert_eq!(prompt, "Delete Anchor? This cannot be undone.");
        assert_eq!(sync.api().requests.load(Ordering::SeqCst), 0);
        assert_eq!(sync.with_mirror(|m| m.products().len()), 3);
    }

    #[tokio::test]
    async fn test_delete_removes_on_success() {
        let sync = DashboardSync::new(FakeApi::with(seeded()), seeded());

        sync.delete(ProductId::new(1), |_| true).await.unwrap();

        assert!(sync.with_mirror(|m| m.get(ProductId::new(1)).is_none()));
        assert_eq!(message(&sync).as_deref(), Some(DELETED));
    }

    #[tokio::test]
    async fn test_dismissed_status_is_hidden() {
        let sync = DashboardSync::new(FakeApi::with(seeded()), seeded());
        sync.delete(ProductId::new(3), |_| true).await.unwrap();
        assert!(message(&sync).is_some());

        sync.dismiss_status();

        assert_eq!(message(&sync), None);
        assert_eq!(sync.with_mirror(|m| m.products().len()), 2);
    }

    #[tokio::test]
    async fn test_bulk_delete_failure_keeps_mirror_and_refetches() {
        let api = FakeApi {
            failing_deletes: vec![ProductId::new(2)],
            ..FakeApi::with(seeded())
        };
        let sync = DashboardSync::new(api, seeded());
        let selection = Selection::Ids(vec![ProductId::new(1), ProductId::new(2), ProductId::new(3)]);

        let err = sync.bulk_delete(selection, |_| true).await.unwrap_err();

        assert!(matches!(err, SyncError::Api(ApiError::NotFound)));
        sync.with_mirror(|mirror| {
            assert_eq!(mirror.products().len(), 3);
            assert!(mirror.is_stale());
        });
        assert_eq!(message(&sync).as_deref(), Some("Product not found."));

        // A and C were deleted server-side; the next operation sees that.
        sync.adjust(ProductId::new(2), 1).await.unwrap();
        assert_eq!(sync.api().lists.load(Ordering::SeqCst), 1);
        sync.with_mirror(|mirror| {
            assert!(!mirror.is_stale());
            assert_eq!(mirror.products().len(), 1);
            assert_eq!(mirror.products()[0].on_hand, 2);
        });
    }

    #[tokio::test]
    async fn test_bulk_delete_all() {
        let sync = DashboardSync::new(FakeApi::with(seeded()), seeded());
        let mut prompt = String::new();

        let deleted = sync
            .bulk_delete(Selection::All, |p| {
                prompt = p.to_string();
                true
            })
            .await
            .unwrap();

        assert_eq!(deleted, 3);
        assert_eq!(prompt, "Delete 3 products? This cannot be undone.");
        assert!(sync.with_mirror(|m| m.products().is_empty()));
        assert!(sync.api().stored().is_empty());
        assert_eq!(message(&sync).as_deref(), Some(BULK_DELETED));
    }

    #[tokio::test]
    async fn test_bulk_delete_nothing_selected() {
        let sync = DashboardSync::new(FakeApi::default(), Vec::new());

        let deleted = sync
            .bulk_delete(Selection::All, |_| panic!("nothing to confirm"))
            .await
            .unwrap();

        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_single_selection_prompt() {
        let sync = DashboardSync::new(FakeApi::with(seeded()), seeded());
        let mut prompt = String::new();

        let _ = sync
            .bulk_delete(Selection::Ids(vec![ProductId::new(3)]), |p| {
                prompt = p.to_string();
                false
            })
            .await;

        assert_eq!(prompt, "Delete the selected product?");
    }

    #[tokio::test]
    async fn test_product_is_locked_while_delete_in_flight() {
        let gate = Arc::new(Notify::new());
        let api = FakeApi {
            gate: Some(Arc::clone(&gate)),
            ..FakeApi::with(seeded())
        };
        let sync = DashboardSync::new(api, seeded());
        let id = ProductId::new(1);

        let (deleted, adjusted) = tokio::join!(sync.delete(id, |_| true), async {
            assert_eq!(sync.with_mirror(|m| m.pending(id)), Some(Pending::Deleting));
            let adjusted = sync.adjust(id, 1).await;
            gate.notify_one();
            adjusted
        });

        assert!(deleted.is_ok());
        assert!(matches!(adjusted, Err(SyncError::Busy(busy)) if busy == id));
    }

    #[tokio::test]
    async fn test_results_after_unmount_are_discarded() {
        let gate = Arc::new(Notify::new());
        let api = FakeApi {
            gate: Some(Arc::clone(&gate)),
            ..FakeApi::default()
        };
        let sync = DashboardSync::new(api, Vec::new());

        let (created, ()) = tokio::join!(sync.create(fields("Widget", "W-1")), async {
            sync.unmount();
            gate.notify_one();
        });

        assert!(matches!(created, Err(SyncError::Unmounted)));
        // The server still created it; the mirror did not record it.
        assert_eq!(sync.api().stored().len(), 1);
        assert!(sync.with_mirror(|m| m.products().is_empty()));
        assert_eq!(sync.status(Instant::now()), None);
    }
}
