//! The synchronization engine against a live server.

#![allow(clippy::unwrap_used)]

use std::time::Instant;

use stockroom_core::{ProductFields, ProductId};
use stockroom_dashboard::{
    ApiError, DashboardSync, HttpInventoryClient, InventoryApi, Selection, SyncError, Tone,
};
use stockroom_integration_tests::TwoStores;

async fn dashboard(seeded: &TwoStores) -> DashboardSync<HttpInventoryClient> {
    let client = seeded.server.signed_in("admin@shop.com").await;
    let products = client.list().await.unwrap();
    DashboardSync::new(client, products)
}

fn names(sync: &DashboardSync<HttpInventoryClient>) -> Vec<String> {
    sync.with_mirror(|m| m.sorted().iter().map(|p| p.name.clone()).collect())
}

#[tokio::test]
async fn test_create_update_delete_round_trip() {
    let seeded = TwoStores::seed().await;
    let sync = dashboard(&seeded).await;

    let created = sync
        .create(ProductFields {
            name: "  anvil ".to_string(),
            sku: "AN-1".to_string(),
            reorder_point: 3,
            on_hand: 1,
            max: 10,
        })
        .await
        .unwrap();
    assert_eq!(created.name, "anvil");
    assert_eq!(names(&sync), vec!["Anchor", "anvil", "Bolt", "Clamp"]);
    assert_eq!(sync.with_mirror(|m| m.low_stock_count()), 1);

    let mut edited = created.fields();
    edited.on_hand = 8;
    let updated = sync.update(created.id, edited).await.unwrap();
    assert_eq!(updated.on_hand, 8);
    assert_eq!(sync.with_mirror(|m| m.low_stock_count()), 0);

    sync.delete(created.id, |_| true).await.unwrap();
    assert_eq!(names(&sync), vec!["Anchor", "Bolt", "Clamp"]);
    let status = sync.status(Instant::now()).unwrap();
    assert_eq!(status.tone, Tone::Success);
    assert_eq!(status.message, "Product deleted.");
}

#[tokio::test]
async fn test_server_rejection_leaves_mirror_unchanged() {
    let seeded = TwoStores::seed().await;
    let sync = dashboard(&seeded).await;
    let before = sync.with_mirror(|m| m.products().to_vec());

    let err = sync
        .create(ProductFields {
            name: "Anchor again".to_string(),
            sku: "A-1".to_string(),
            ..ProductFields::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Api(ApiError::Validation(_))));
    assert_eq!(sync.with_mirror(|m| m.products().to_vec()), before);
    let status = sync.status(Instant::now()).unwrap();
    assert_eq!(status.tone, Tone::Critical);
    assert_eq!(status.message, "Sku has already been taken");
}

#[tokio::test]
async fn test_failed_bulk_delete_keeps_mirror_then_refetches() {
    let seeded = TwoStores::seed().await;
    let sync = dashboard(&seeded).await;
    let [anchor, _bolt, clamp] = [0, 1, 2].map(|i| seeded.shop_products[i].id);
    // Not visible to this store: its delete fails with 404.
    let foreign = seeded.other_products[0].id;

    let err = sync
        .bulk_delete(Selection::Ids(vec![anchor, foreign, clamp]), |prompt| {
            assert_eq!(prompt, "Delete 3 products? This cannot be undone.");
            true
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Api(ApiError::NotFound)));
    assert_eq!(names(&sync), vec!["Anchor", "Bolt", "Clamp"]);
    assert!(sync.with_mirror(|m| m.is_stale()));
    assert_eq!(
        sync.status(Instant::now()).unwrap().message,
        "Product not found."
    );

    // Anchor and Clamp were deleted server-side before the failure surfaced.
    sync.ensure_fresh().await.unwrap();
    assert_eq!(names(&sync), vec!["Bolt"]);
    assert!(!sync.with_mirror(|m| m.is_stale()));
}

#[tokio::test]
async fn test_bulk_delete_all() {
    let seeded = TwoStores::seed().await;
    let sync = dashboard(&seeded).await;

    let deleted = sync.bulk_delete(Selection::All, |_| true).await.unwrap();

    assert_eq!(deleted, 3);
    assert!(names(&sync).is_empty());
    assert!(sync.api().list().await.unwrap().is_empty());

    // The other store is untouched.
    let theirs = seeded
        .server
        .state
        .scope_for(&seeded.other_admin)
        .products()
        .list()
        .await
        .unwrap();
    assert_eq!(theirs.len(), 3);
}

#[tokio::test]
async fn test_adjust_updates_mirror_from_response() {
    let seeded = TwoStores::seed().await;
    let sync = dashboard(&seeded).await;
    let bolt = seeded.shop_products[1].id;

    let adjusted = sync.adjust(bolt, -9).await.unwrap();

    assert_eq!(adjusted.on_hand, 1);
    let mirrored = sync.with_mirror(|m| m.get(bolt).cloned()).unwrap();
    assert_eq!(mirrored, adjusted);
    assert!(mirrored.is_low_stock());
}

#[tokio::test]
async fn test_unknown_product_cannot_be_deleted() {
    let seeded = TwoStores::seed().await;
    let sync = dashboard(&seeded).await;

    let err = sync
        .delete(ProductId::new(i32::MAX), |_| panic!("no prompt for unknown products"))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Api(ApiError::NotFound)));
}
