//! Product endpoints: tenant scoping, forgery protection, locked adjustments.

#![allow(clippy::unwrap_used)]

use futures::future::join_all;

use stockroom_core::{ProductFields, ProductPatch};
use stockroom_dashboard::{ApiError, InventoryApi};
use stockroom_integration_tests::{PASSWORD, TwoStores};

fn fields(name: &str, sku: &str) -> ProductFields {
    ProductFields {
        name: name.to_string(),
        sku: sku.to_string(),
        reorder_point: 1,
        on_hand: 4,
        max: 20,
    }
}

#[tokio::test]
async fn test_sku_is_unique_per_store() {
    let seeded = TwoStores::seed().await;
    let client = seeded.server.signed_in("admin@shop.com").await;

    // "A-1" also exists in the other store; only the local copy conflicts.
    let err = client.create(&fields("Anchor copy", "A-1")).await.unwrap_err();
    assert!(
        matches!(err, ApiError::Validation(ref m) if m.contains(&"Sku has already been taken".to_string()))
    );

    let created = client.create(&fields("Yoyo", "Y-1")).await.unwrap();
    assert_eq!(created.store_id, seeded.shop.id);
    assert_eq!(client.list().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_blank_fields_are_all_reported() {
    let seeded = TwoStores::seed().await;
    let client = seeded.server.signed_in("admin@shop.com").await;

    let mut input = fields(" ", "");
    input.on_hand = -1;
    let err = client.create(&input).await.unwrap_err();

    let ApiError::Validation(messages) = err else {
        panic!("expected validation errors, got {err:?}");
    };
    assert!(messages.contains(&"Name can't be blank".to_string()));
    assert!(messages.contains(&"Sku can't be blank".to_string()));
    assert!(messages.contains(&"On hand must be greater than or equal to 0".to_string()));
}

#[tokio::test]
async fn test_other_store_products_are_not_found() {
    let seeded = TwoStores::seed().await;
    let client = seeded.server.signed_in("admin@shop.com").await;
    let foreign = &seeded.other_products[0];

    let patch = ProductPatch {
        name: Some("Hijacked".to_string()),
        ..ProductPatch::default()
    };
    assert!(matches!(client.update(foreign.id, &patch).await, Err(ApiError::NotFound)));
    assert!(matches!(client.adjust(foreign.id, 1).await, Err(ApiError::NotFound)));
    assert!(matches!(client.delete(foreign.id).await, Err(ApiError::NotFound)));

    let theirs = seeded
        .server
        .state
        .scope_for(&seeded.other_admin)
        .products()
        .list()
        .await
        .unwrap();
    assert!(theirs.contains(foreign));
}

#[tokio::test]
async fn test_patch_changes_only_given_fields() {
    let seeded = TwoStores::seed().await;
    let client = seeded.server.signed_in("admin@shop.com").await;
    let bolt = &seeded.shop_products[1];

    let updated = client
        .update(
            bolt.id,
            &ProductPatch {
                on_hand: Some(7),
                ..ProductPatch::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.on_hand, 7);
    assert_eq!(updated.name, bolt.name);
    assert_eq!(updated.sku, bolt.sku);
    assert_eq!(updated.max, bolt.max);
}

#[tokio::test]
async fn test_forged_token_is_rejected() {
    let seeded = TwoStores::seed().await;
    let mut client = seeded.server.signed_in("admin@shop.com").await;
    client.set_csrf_token("forged");

    let err = client.create(&fields("Yoyo", "Y-1")).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidAuthenticityToken));
    assert!(matches!(
        client.delete(seeded.shop_products[0].id).await,
        Err(ApiError::InvalidAuthenticityToken)
    ));

    // Reads need no token.
    assert_eq!(client.list().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_anonymous_writes_are_rejected() {
    let seeded = TwoStores::seed().await;
    let client = seeded.server.client();

    assert!(matches!(
        client.create(&fields("Yoyo", "Y-1")).await,
        Err(ApiError::Unauthorized)
    ));
    assert!(matches!(
        client.delete(seeded.shop_products[0].id).await,
        Err(ApiError::Unauthorized)
    ));
}

#[tokio::test]
async fn test_concurrent_adjustments_are_not_lost() {
    let seeded = TwoStores::seed().await;
    let client = seeded.server.signed_in("admin@shop.com").await;
    let anchor = &seeded.shop_products[0];
    assert_eq!(anchor.on_hand, 10);

    let results = join_all([5, -3, 2, -1].map(|delta| client.adjust(anchor.id, delta))).await;
    assert!(results.iter().all(Result::is_ok));

    let products = client.list().await.unwrap();
    let stored = products.iter().find(|p| p.id == anchor.id).unwrap();
    assert_eq!(stored.on_hand, 13);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_patch_does_not_lose_concurrent_adjustments() {
    let seeded = TwoStores::seed().await;
    let client = seeded.server.signed_in("admin@shop.com").await;
    let anchor = &seeded.shop_products[0];

    let renames = (0..4).map(|i| {
        let patch = ProductPatch {
            name: Some(format!("Anchor {i}")),
            reorder_point: Some(i),
            ..ProductPatch::default()
        };
        let client = &client;
        async move { client.update(anchor.id, &patch).await }
    });
    let adjustments = [5, -3, 2, -1].map(|delta| client.adjust(anchor.id, delta));

    let (renamed, adjusted) = futures::join!(join_all(renames), join_all(adjustments));
    assert!(renamed.iter().all(Result::is_ok));
    assert!(adjusted.iter().all(Result::is_ok));

    let products = client.list().await.unwrap();
    let stored = products.iter().find(|p| p.id == anchor.id).unwrap();
    assert_eq!(stored.on_hand, 13);
    assert!(stored.name.starts_with("Anchor "));
}

#[tokio::test]
async fn test_malformed_wrapped_patch_is_rejected() {
    let seeded = TwoStores::seed().await;
    let http = reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .unwrap();
    let base = &seeded.server.base_url;

    let signed_in = http
        .post(format!("{base}/session"))
        .form(&[("email", "admin@shop.com"), ("password", PASSWORD)])
        .send()
        .await
        .unwrap();
    assert!(signed_in.status().is_success() || signed_in.status().is_redirection());
    let session: serde_json::Value = http
        .get(format!("{base}/session"))
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = session["csrf_token"].as_str().unwrap().to_string();
    let bolt = &seeded.shop_products[1];

    let response = http
        .patch(format!("{base}/products/{}", bolt.id))
        .header(reqwest::header::ACCEPT, "application/json")
        .header("x-csrf-token", token)
        .json(&serde_json::json!({"product": {"on_hand": "7", "name": "Renamed"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

    let client = seeded.server.signed_in("admin@shop.com").await;
    let products = client.list().await.unwrap();
    let stored = products.iter().find(|p| p.id == bolt.id).unwrap();
    assert_eq!(stored.name, bolt.name);
}

#[tokio::test]
async fn test_adjustment_cannot_go_negative() {
    let seeded = TwoStores::seed().await;
    let client = seeded.server.signed_in("admin@shop.com").await;
    let anchor = &seeded.shop_products[0];

    let err = client.adjust(anchor.id, -11).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let products = client.list().await.unwrap();
    assert_eq!(products.iter().find(|p| p.id == anchor.id).unwrap().on_hand, 10);
}

#[tokio::test]
async fn test_delete_is_permanent() {
    let seeded = TwoStores::seed().await;
    let client = seeded.server.signed_in("admin@shop.com").await;
    let clamp = seeded.shop_products[2].id;

    client.delete(clamp).await.unwrap();
    assert!(matches!(client.delete(clamp).await, Err(ApiError::NotFound)));
    assert!(client.list().await.unwrap().iter().all(|p| p.id != clamp));
}
