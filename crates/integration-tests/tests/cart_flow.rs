//! Guest cart flows against the mock storefront.
//!
//! Run with: cargo test -p basket-integration-tests

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use basket_client::api::ApiError;
use basket_client::{AddItemOptions, CartError, CartManager};
use basket_core::ProductId;
use basket_integration_tests::{MockStorefront, dec};
use tempfile::TempDir;

async fn storefront() -> MockStorefront {
    let storefront = MockStorefront::start()
        .await
        .expect("Failed to start mock storefront");
    storefront.add_product(MockStorefront::product("sku-1", "Linen Shirt", "25.00", 10));
    storefront.add_product(MockStorefront::product("sku-2", "Canvas Tote", "10.00", 10));
    storefront
}

async fn open(storefront: &MockStorefront, dir: &TempDir) -> CartManager {
    let manager = CartManager::from_config(storefront.guest_config(dir.path()))
        .expect("Failed to build cart manager");
    manager.init().await;
    manager
}

fn sku(id: &str) -> ProductId {
    ProductId::new(id)
}

#[tokio::test]
async fn test_guest_cart_survives_restart() {
    let storefront = storefront().await;
    storefront.set_shipping(Some("4.50"));
    let dir = TempDir::new().unwrap();

    let manager = open(&storefront, &dir).await;
    manager
        .add_item(&sku("sku-1"), 2, AddItemOptions::default())
        .await
        .unwrap();
    let before = manager.cart().await;
    assert_eq!(before.totals().subtotal, dec("50.00"));
    assert_eq!(before.totals().shipping, dec("4.50"));
    assert_eq!(before.totals().total, dec("54.50"));
    manager.shutdown().await;

    assert!(dir.path().join("basket_cart.json").exists());

    let reopened = open(&storefront, &dir).await;
    let after = reopened.cart().await;
    assert_eq!(after.items(), before.items());
    assert_eq!(after.totals(), before.totals());
    assert_eq!(reopened.items_count(), 2);
}

#[tokio::test]
async fn test_product_lookups_are_cached() {
    let storefront = storefront().await;
    let dir = TempDir::new().unwrap();
    let manager = open(&storefront, &dir).await;

    for _ in 0..3 {
        manager
            .add_item(&sku("sku-1"), 1, AddItemOptions::default())
            .await
            .unwrap();
    }

    assert_eq!(storefront.product_hits(), 1);
    assert_eq!(manager.cart().await.len(), 1);
    assert_eq!(manager.items_count(), 3);
}

#[tokio::test]
async fn test_tax_and_shipping_quotes() {
    let storefront = storefront().await;
    storefront.set_tax_rate(Some("0.21"));
    storefront.set_shipping(Some("6.00"));
    let dir = TempDir::new().unwrap();
    let manager = open(&storefront, &dir).await;

    manager
        .add_item(&sku("sku-2"), 3, AddItemOptions::default())
        .await
        .unwrap();
    let totals = *manager.cart().await.totals();
    assert_eq!(totals.tax, dec("6.30"));
    assert_eq!(totals.shipping, dec("6.00"));
    assert_eq!(totals.total, dec("42.30"));

    let quote = storefront.last_quote().unwrap();
    assert_eq!(quote.subtotal, dec("30"));
    assert_eq!(quote.items, 3);
    assert_eq!(quote.weight, dec("1.5"));
    assert_eq!(quote.currency, "EUR");

    // Crossing the free shipping threshold
    manager
        .add_item(&sku("sku-1"), 5, AddItemOptions::default())
        .await
        .unwrap();
    let totals = *manager.cart().await.totals();
    assert_eq!(totals.subtotal, dec("155.00"));
    assert_eq!(totals.shipping, dec("0"));
    assert_eq!(totals.tax, dec("32.55"));
    assert_eq!(totals.total, dec("187.55"));
}

#[tokio::test]
async fn test_slow_quotes_fall_back() {
    let storefront = storefront().await;
    storefront.set_tax_rate(Some("0.20"));
    storefront.set_shipping(Some("3.00"));
    storefront.set_quote_delay(Some(Duration::from_millis(800)));
    let dir = TempDir::new().unwrap();

    let mut config = storefront.guest_config(dir.path());
    config.quote_timeout = Duration::from_millis(100);
    let manager = CartManager::from_config(config).unwrap();
    manager.init().await;

    manager
        .add_item(&sku("sku-2"), 1, AddItemOptions::default())
        .await
        .unwrap();
    let totals = *manager.cart().await.totals();
    assert_eq!(totals.tax, dec("0"));
    assert_eq!(totals.shipping, dec("5.99"));
    assert_eq!(totals.total, dec("15.99"));
}

#[tokio::test]
async fn test_empty_quotes_fall_back() {
    let storefront = storefront().await;
    storefront.set_tax_rate(None);
    storefront.set_shipping(None);
    let dir = TempDir::new().unwrap();
    let manager = open(&storefront, &dir).await;

    manager
        .add_item(&sku("sku-1"), 1, AddItemOptions::default())
        .await
        .unwrap();
    let totals = *manager.cart().await.totals();
    assert_eq!(totals.tax, dec("0"));
    assert_eq!(totals.shipping, dec("5.99"));
    assert_eq!(totals.total, dec("30.99"));
}

#[tokio::test]
async fn test_coupon_validation_round_trip() {
    let storefront = storefront().await;
    storefront.set_shipping(Some("0"));
    storefront.add_percentage_coupon("SAVE10", 10, Some("40.00"));
    let dir = TempDir::new().unwrap();
    let manager = open(&storefront, &dir).await;

    manager
        .add_item(&sku("sku-2"), 1, AddItemOptions::default())
        .await
        .unwrap();
    let err = manager.apply_coupon("save10").await.unwrap_err();
    assert!(
        matches!(&err, CartError::InvalidCoupon(reason) if reason == "Minimum order is 40.00"),
        "unexpected error: {err:?}"
    );
    assert!(manager.cart().await.coupon().is_none());

    manager
        .add_item(&sku("sku-1"), 2, AddItemOptions::default())
        .await
        .unwrap();
    let coupon = manager.apply_coupon(" save10 ").await.unwrap();
    assert_eq!(coupon.code, "SAVE10");

    let cart = manager.cart().await;
    assert_eq!(cart.totals().discount, dec("6.00"));
    assert_eq!(cart.totals().total, dec("54.00"));

    let err = manager.apply_coupon("NOPE").await.unwrap_err();
    assert!(matches!(&err, CartError::InvalidCoupon(reason) if reason == "Coupon does not exist"));
    assert_eq!(
        manager.cart().await.coupon().map(|c| c.code.as_str()),
        Some("SAVE10")
    );
}

#[tokio::test]
async fn test_fixed_coupon_never_exceeds_subtotal() {
    let storefront = storefront().await;
    storefront.set_shipping(Some("2.00"));
    storefront.add_fixed_coupon("BIG50", "50.00");
    let dir = TempDir::new().unwrap();
    let manager = open(&storefront, &dir).await;

    manager
        .add_item(&sku("sku-2"), 2, AddItemOptions::default())
        .await
        .unwrap();
    manager.apply_coupon("BIG50").await.unwrap();

    let totals = *manager.cart().await.totals();
    assert_eq!(totals.discount, dec("20.00"));
    assert_eq!(totals.total, dec("2.00"));
}

#[tokio::test]
async fn test_unknown_and_withdrawn_products() {
    let storefront = storefront().await;
    let dir = TempDir::new().unwrap();
    let manager = open(&storefront, &dir).await;

    let err = manager
        .add_item(&sku("ghost"), 1, AddItemOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CartError::ProductNotFound(_)));

    manager
        .add_item(&sku("sku-1"), 1, AddItemOptions::default())
        .await
        .unwrap();
    manager
        .add_item(&sku("sku-2"), 1, AddItemOptions::default())
        .await
        .unwrap();
    manager.shutdown().await;

    storefront.remove_product("sku-1");
    storefront.set_stock("sku-2", 0);

    let reopened = open(&storefront, &dir).await;
    assert!(reopened.cart().await.is_empty());
}

#[tokio::test]
async fn test_stock_is_checked_against_the_catalog() {
    let storefront = storefront().await;
    storefront.set_stock("sku-1", 3);
    let dir = TempDir::new().unwrap();
    let manager = open(&storefront, &dir).await;

    manager
        .add_item(&sku("sku-1"), 2, AddItemOptions::default())
        .await
        .unwrap();
    let err = manager
        .add_item(&sku("sku-1"), 2, AddItemOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CartError::InsufficientStock { requested: 4, .. }));
    assert_eq!(manager.items_count(), 2);
}

#[tokio::test]
async fn test_variants_are_separate_lines() {
    let storefront = storefront().await;
    let mut tee = MockStorefront::product("tee", "Tee", "18.00", 0);
    tee.available = true;
    tee.variants = vec![
        MockStorefront::variant("tee-s", 4, &[("size", "S")]),
        MockStorefront::variant("tee-m", 1, &[("size", "M")]),
    ];
    storefront.add_product(tee);
    let dir = TempDir::new().unwrap();
    let manager = open(&storefront, &dir).await;

    manager
        .add_item(&sku("tee"), 2, AddItemOptions::variant("tee-s"))
        .await
        .unwrap();
    manager
        .add_item(&sku("tee"), 1, AddItemOptions::variant("tee-m"))
        .await
        .unwrap();
    let err = manager
        .add_item(&sku("tee"), 1, AddItemOptions::variant("tee-m"))
        .await
        .unwrap_err();
    assert!(matches!(err, CartError::InsufficientStock { .. }));

    let cart = manager.cart().await;
    assert_eq!(cart.len(), 2);
    assert_eq!(cart.totals().subtotal, dec("54.00"));
}

#[tokio::test]
async fn test_rate_limit_surfaces_retry_after() {
    let storefront = storefront().await;
    let dir = TempDir::new().unwrap();
    let manager = open(&storefront, &dir).await;

    storefront.rate_limit_next(7);
    let err = manager
        .add_item(&sku("sku-1"), 1, AddItemOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CartError::Network(ApiError::RateLimited(7))));

    manager
        .add_item(&sku("sku-1"), 1, AddItemOptions::default())
        .await
        .unwrap();
    assert_eq!(manager.items_count(), 1);
}

#[tokio::test]
async fn test_cached_catalog_keeps_cart_editable_during_outage() {
    let storefront = storefront().await;
    storefront.set_shipping(Some("4.00"));
    let dir = TempDir::new().unwrap();
    let manager = open(&storefront, &dir).await;

    manager
        .add_item(&sku("sku-1"), 1, AddItemOptions::default())
        .await
        .unwrap();

    storefront.set_unavailable(true);

    // Cached product, failed quotes fall back
    manager.update_item_quantity(0, 3).await.unwrap();
    let totals = *manager.cart().await.totals();
    assert_eq!(totals.subtotal, dec("75.00"));
    assert_eq!(totals.shipping, dec("5.99"));

    let err = manager
        .add_item(&sku("sku-2"), 1, AddItemOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CartError::Network(ApiError::Status { status: 503, .. })
    ));
    assert_eq!(manager.items_count(), 3);
}
