//! Integration tests for the session bag.
//!
//! The bag lives in the session between requests; these tests go through the
//! same session helpers the bag and checkout handlers use.

use std::sync::Arc;

use rust_decimal::Decimal;
use tower_sessions::{MemoryStore, Session};

use kestrel_core::{Bag, DeliveryPolicy, ProductId};
use kestrel_storefront::models::FlashLevel;
use kestrel_storefront::services::{bag, flash};
use kestrel_storefront::testing::{InMemoryStore, product};

fn session() -> Session {
    Session::new(None, Arc::new(MemoryStore::default()), None)
}

fn catalog() -> InMemoryStore {
    InMemoryStore::with_products([
        product(1, "Canvas Tote", "10.00", false),
        product(2, "Slim Jeans", "30.00", true),
        product(3, "Wool Scarf", "15.50", false),
    ])
}

#[tokio::test]
async fn test_bag_survives_between_requests() {
    let session = session();

    let mut current = bag::load(&session).await;
    assert!(current.is_empty());
    current.add(ProductId::new(2), 1, Some("m")).unwrap();
    bag::save(&session, &current).await.unwrap();

    let mut current = bag::load(&session).await;
    current.add(ProductId::new(2), 2, Some("m")).unwrap();
    current.add(ProductId::new(1), 1, None).unwrap();
    bag::save(&session, &current).await.unwrap();

    let current = bag::load(&session).await;
    assert_eq!(current.total_quantity(), 4);
    assert_eq!(current.to_snapshot(), r#"{"1":1,"2":{"items_by_size":{"m":3}}}"#);

    bag::clear(&session).await.unwrap();
    assert!(bag::load(&session).await.is_empty());
}

#[tokio::test]
async fn test_priced_bag_below_free_delivery() {
    let session = session();
    let mut current = Bag::new();
    current.add(ProductId::new(1), 2, None).unwrap();
    current.add(ProductId::new(3), 1, None).unwrap();
    bag::save(&session, &current).await.unwrap();

    let (_, context) = bag::load_context(&session, &catalog(), &DeliveryPolicy::default())
        .await
        .unwrap();

    assert_eq!(context.lines.len(), 2);
    assert_eq!(context.product_count, 3);
    assert_eq!(context.subtotal, Decimal::new(3550, 2));
    assert_eq!(context.delivery, Decimal::new(355, 2));
    assert_eq!(context.grand_total, Decimal::new(3905, 2));
    assert_eq!(context.free_delivery_delta, Decimal::new(1450, 2));
    assert!(flash::take(&session).await.is_empty());
}

#[tokio::test]
async fn test_sized_lines_are_priced_per_size() {
    let session = session();
    let mut current = Bag::new();
    current.add(ProductId::new(2), 1, Some("s")).unwrap();
    current.add(ProductId::new(2), 1, Some("xl")).unwrap();
    bag::save(&session, &current).await.unwrap();

    let (_, context) = bag::load_context(&session, &catalog(), &DeliveryPolicy::default())
        .await
        .unwrap();

    let sizes: Vec<_> = context.lines.iter().map(|l| l.size.as_deref()).collect();
    assert_eq!(sizes, vec![Some("s"), Some("xl")]);
    // 60.00 ships free.
    assert_eq!(context.delivery, Decimal::ZERO);
    assert_eq!(context.grand_total, Decimal::new(6000, 2));
}

#[tokio::test]
async fn test_discontinued_products_are_pruned_with_a_warning() {
    let session = session();
    let store = catalog();
    let mut current = Bag::new();
    current.add(ProductId::new(1), 1, None).unwrap();
    current.add(ProductId::new(2), 1, Some("m")).unwrap();
    current.add(ProductId::new(3), 1, None).unwrap();
    bag::save(&session, &current).await.unwrap();

    store.remove_product(ProductId::new(2));
    store.remove_product(ProductId::new(3));

    let (pruned, context) = bag::load_context(&session, &store, &DeliveryPolicy::default())
        .await
        .unwrap();

    assert_eq!(pruned.product_ids(), vec![ProductId::new(1)]);
    assert_eq!(context.subtotal, Decimal::new(1000, 2));
    assert_eq!(bag::load(&session).await, pruned);

    let messages = flash::take(&session).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].level, FlashLevel::Warning);
    assert_eq!(
        messages[0].text,
        "2 items in your bag are no longer available and were removed."
    );

    // Messages are shown once.
    assert!(flash::take(&session).await.is_empty());
}

#[tokio::test]
async fn test_adjust_to_zero_empties_the_bag() {
    let session = session();
    let mut current = Bag::new();
    current.add(ProductId::new(3), 4, None).unwrap();
    current.adjust(ProductId::new(3), 0, None).unwrap();
    bag::save(&session, &current).await.unwrap();

    let (loaded, context) = bag::load_context(&session, &catalog(), &DeliveryPolicy::default())
        .await
        .unwrap();

    assert!(loaded.is_empty());
    assert!(context.lines.is_empty());
    assert_eq!(context.grand_total, Decimal::ZERO);
}
