//! Integration tests for checkout and webhook converging on one order.
//!
//! Each scenario drives the order materializer and the webhook reconciler
//! against the in-memory store, the way the checkout and webhook handlers do.

use std::time::Duration;

use rust_decimal::Decimal;

use kestrel_core::{Bag, BagError, OrderOrigin, ProductId, UserId};
use kestrel_integration_tests::shipping;
use kestrel_storefront::config::WebhookRetryConfig;
use kestrel_storefront::db::OrderStore;
use kestrel_storefront::models::{NewOrder, OrderInsert};
use kestrel_storefront::services::{
    CheckoutError, MaterializeOutcome, OrderMaterializer, PaymentNotification, ReconcileError,
    ReconcileOutcome, WebhookReconciler,
};
use kestrel_storefront::testing::{InMemoryStore, RecordingNotifier, product};

const PID: &str = "pi_3Kestrel";

fn retry() -> WebhookRetryConfig {
    WebhookRetryConfig {
        attempts: 5,
        delay: Duration::ZERO,
    }
}

fn store() -> InMemoryStore {
    InMemoryStore::with_products([
        product(1, "Canvas Tote", "10.00", false),
        product(2, "Slim Jeans", "30.00", true),
    ])
}

/// Two totes: 20.00 plus 10% delivery.
fn tote_bag() -> Bag {
    let mut bag = Bag::new();
    bag.add(ProductId::new(1), 2, None).unwrap();
    bag
}

fn payment(bag: &Bag, grand_total: &str) -> PaymentNotification {
    PaymentNotification {
        stripe_pid: PID.to_string(),
        bag: bag.to_snapshot(),
        save_info: false,
        username: None,
        shipping: shipping(),
        grand_total: grand_total.parse().unwrap(),
    }
}

async fn checkout(store: &InMemoryStore, bag: &Bag) -> MaterializeOutcome {
    let order = NewOrder::new(
        shipping(),
        bag.to_snapshot(),
        PID.to_string(),
        OrderOrigin::Checkout,
    );
    OrderMaterializer::new(store)
        .materialize(&order, bag)
        .await
        .unwrap()
}

// =============================================================================
// Checkout first
// =============================================================================

#[tokio::test]
async fn test_checkout_order_is_matched_on_first_attempt() {
    let store = store();
    let notifier = RecordingNotifier::default();
    let bag = tote_bag();

    let created = checkout(&store, &bag).await;
    assert!(matches!(created, MaterializeOutcome::Created(_)));
    assert_eq!(created.order().grand_total, Decimal::new(2200, 2));

    let outcome = WebhookReconciler::new(&store, &notifier, retry())
        .reconcile(&payment(&bag, "22.00"))
        .await
        .unwrap();

    match outcome {
        ReconcileOutcome::Matched { order, attempts } => {
            assert_eq!(attempts, 1);
            assert_eq!(order.order_number, created.order().order_number);
            assert_eq!(order.origin, OrderOrigin::Checkout);
        }
        other => panic!("expected a match, got {other:?}"),
    }
    assert_eq!(store.orders().len(), 1);
    assert_eq!(store.lookups(), 1);
    assert_eq!(
        notifier.sent(),
        vec![(created.order().order_number.clone(), 1)]
    );
}

#[tokio::test]
async fn test_webhook_keeps_polling_until_the_order_appears() {
    let store = store();
    let notifier = RecordingNotifier::default();
    let bag = tote_bag();
    checkout(&store, &bag).await;
    store.hide_orders_for_lookups(3);

    let outcome = WebhookReconciler::new(&store, &notifier, retry())
        .reconcile(&payment(&bag, "22.00"))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Matched { attempts: 4, .. }));
    assert_eq!(store.lookups(), 4);
    assert_eq!(store.orders().len(), 1);
}

#[tokio::test]
async fn test_match_ignores_letter_case() {
    let store = store();
    let notifier = RecordingNotifier::default();
    let bag = tote_bag();
    checkout(&store, &bag).await;

    let mut shouted = payment(&bag, "22.00");
    shouted.shipping.full_name = "ADA LOVELACE".to_string();
    shouted.shipping.town_or_city = "dublin".to_string();

    let outcome = WebhookReconciler::new(&store, &notifier, retry())
        .reconcile(&shouted)
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Matched { attempts: 1, .. }));
}

// =============================================================================
// Webhook only
// =============================================================================

#[tokio::test]
async fn test_webhook_creates_order_after_every_lookup_misses() {
    let store = store();
    let notifier = RecordingNotifier::default();
    let mut bag = tote_bag();
    bag.add(ProductId::new(2), 1, Some("m")).unwrap();
    bag.add(ProductId::new(2), 2, Some("l")).unwrap();

    let outcome = WebhookReconciler::new(&store, &notifier, retry())
        .reconcile(&payment(&bag, "110.00"))
        .await
        .unwrap();

    let ReconcileOutcome::Created { order } = outcome else {
        panic!("expected the webhook to create the order");
    };
    assert_eq!(store.lookups(), 5);
    assert_eq!(order.origin, OrderOrigin::Webhook);
    assert_eq!(order.original_bag, bag.to_snapshot());
    assert_eq!(order.stripe_pid, PID);
    // 20.00 + 3 x 30.00, over the free delivery threshold.
    assert_eq!(order.order_total, Decimal::new(11000, 2));
    assert_eq!(order.delivery_cost, Decimal::ZERO);
    assert_eq!(order.grand_total, Decimal::new(11000, 2));

    let items = store.line_items(order.id).await.unwrap();
    assert_eq!(items.len(), 3);
    assert!(
        items
            .iter()
            .any(|i| i.product_size.as_deref() == Some("l") && i.quantity == 2)
    );
    assert_eq!(notifier.sent(), vec![(order.order_number.clone(), 3)]);
}

#[tokio::test]
async fn test_single_attempt_configuration_still_looks_once() {
    let store = store();
    let notifier = RecordingNotifier::default();
    let config = WebhookRetryConfig {
        attempts: 1,
        delay: Duration::from_secs(60),
    };

    let outcome = WebhookReconciler::new(&store, &notifier, config)
        .reconcile(&payment(&tote_bag(), "22.00"))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Created { .. }));
    assert_eq!(store.lookups(), 1);
}

// =============================================================================
// Payment intent collisions
// =============================================================================

#[tokio::test]
async fn test_checkout_after_webhook_reuses_the_webhook_order() {
    let store = store();
    let notifier = RecordingNotifier::default();
    let bag = tote_bag();

    let outcome = WebhookReconciler::new(&store, &notifier, retry())
        .reconcile(&payment(&bag, "22.00"))
        .await
        .unwrap();
    let ReconcileOutcome::Created { order: webhook_order } = outcome else {
        panic!("expected the webhook to create the order");
    };

    let late = checkout(&store, &bag).await;

    let MaterializeOutcome::Existing(order) = late else {
        panic!("expected checkout to find the webhook's order");
    };
    assert_eq!(order.order_number, webhook_order.order_number);
    assert_eq!(order.origin, OrderOrigin::Webhook);
    assert_eq!(store.orders().len(), 1);
    assert_eq!(store.all_line_items().len(), 1);
}

#[tokio::test]
async fn test_existing_order_for_payment_intent_is_reused() {
    let store = store();
    let notifier = RecordingNotifier::default();
    let bag = tote_bag();
    let stored = checkout(&store, &bag).await;

    // Same payment intent, different delivery details: no lookup matches,
    // and the insert collides on the payment intent.
    let mut moved = payment(&bag, "22.00");
    moved.shipping.street_address1 = "2 Side Street".to_string();

    let outcome = WebhookReconciler::new(&store, &notifier, retry())
        .reconcile(&moved)
        .await
        .unwrap();

    let ReconcileOutcome::AlreadyRecorded { order } = outcome else {
        panic!("expected the stored order to be reused");
    };
    assert_eq!(order.order_number, stored.order().order_number);
    assert_eq!(store.orders().len(), 1);
    assert_eq!(store.all_line_items().len(), 1);
    assert_eq!(notifier.sent(), vec![(order.order_number.clone(), 1)]);
}

#[tokio::test]
async fn test_stored_order_without_line_items_is_not_confirmed() {
    let store = store();
    let notifier = RecordingNotifier::default();
    let bag = tote_bag();

    // Checkout has written the order row but no line items yet.
    let pending = NewOrder::new(
        shipping(),
        bag.to_snapshot(),
        PID.to_string(),
        OrderOrigin::Checkout,
    );
    let OrderInsert::Created(stored) = store.create_order(&pending).await.unwrap() else {
        panic!("expected a fresh order row");
    };

    let outcome = WebhookReconciler::new(&store, &notifier, retry())
        .reconcile(&payment(&bag, "22.00"))
        .await
        .unwrap();

    let ReconcileOutcome::AlreadyRecorded { order } = outcome else {
        panic!("expected the pending order to be reused");
    };
    assert_eq!(order.order_number, stored.order_number);
    assert!(order.grand_total.is_zero());
    assert_eq!(store.orders().len(), 1);
    assert!(store.all_line_items().is_empty());
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn test_size_on_unsized_product_rolls_back_the_order() {
    let store = store();
    let notifier = RecordingNotifier::default();
    let mut bag = Bag::new();
    bag.add(ProductId::new(1), 1, Some("m")).unwrap();

    let err = WebhookReconciler::new(&store, &notifier, retry())
        .reconcile(&payment(&bag, "11.00"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Checkout(CheckoutError::Bag(BagError::SizeNotOffered(id)))
            if id == ProductId::new(1)
    ));
    assert!(store.orders().is_empty());
    assert!(store.all_line_items().is_empty());
}

#[tokio::test]
async fn test_unknown_size_label_rolls_back_the_order() {
    let store = store();
    let mut bag = Bag::new();
    bag.add(ProductId::new(2), 1, Some("extraextralarge")).unwrap();
    let order = NewOrder::new(
        shipping(),
        bag.to_snapshot(),
        PID.to_string(),
        OrderOrigin::Checkout,
    );

    let err = OrderMaterializer::new(&store)
        .materialize(&order, &bag)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Bag(BagError::UnknownSize(ref label)) if label == "extraextralarge"
    ));
    assert!(store.orders().is_empty());
}

#[tokio::test]
async fn test_missing_product_rolls_back_the_order() {
    let store = store();
    let notifier = RecordingNotifier::default();
    let mut bag = tote_bag();
    bag.add(ProductId::new(99), 1, None).unwrap();

    let err = WebhookReconciler::new(&store, &notifier, retry())
        .reconcile(&payment(&bag, "33.00"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Checkout(CheckoutError::ProductMissing(id)) if id == ProductId::new(99)
    ));
    assert!(store.orders().is_empty());
    assert!(store.all_line_items().is_empty());
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn test_unparseable_bag_metadata_is_rejected() {
    let store = store();
    let notifier = RecordingNotifier::default();
    let mut broken = payment(&tote_bag(), "22.00");
    broken.bag = "{not json".to_string();

    let err = WebhookReconciler::new(&store, &notifier, retry())
        .reconcile(&broken)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Bag(_)));
    assert!(store.orders().is_empty());
}

#[tokio::test]
async fn test_failed_confirmation_email_does_not_fail_reconciliation() {
    let store = store();
    let notifier = RecordingNotifier::failing();

    let outcome = WebhookReconciler::new(&store, &notifier, retry())
        .reconcile(&payment(&tote_bag(), "22.00"))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Created { .. }));
    assert_eq!(store.orders().len(), 1);
    assert!(notifier.sent().is_empty());
}

// =============================================================================
// Profiles
// =============================================================================

#[tokio::test]
async fn test_signed_in_payment_saves_defaults_and_links_order() {
    let store = store();
    let notifier = RecordingNotifier::default();
    let profile = store.insert_profile(UserId::new(7), "ada");

    let mut paid = payment(&tote_bag(), "22.00");
    paid.username = Some("ada".to_string());
    paid.save_info = true;

    let outcome = WebhookReconciler::new(&store, &notifier, retry())
        .reconcile(&paid)
        .await
        .unwrap();

    assert_eq!(outcome.order().user_profile_id, Some(profile.id));
    let saved = store.profile(profile.id).unwrap().defaults;
    assert_eq!(saved.phone_number.as_deref(), Some("0123456789"));
    assert_eq!(saved.street_address1.as_deref(), Some("1 Main Street"));
    assert_eq!(saved.postcode.as_deref(), Some("D01 F5P2"));
    assert!(saved.street_address2.is_none());
}

#[tokio::test]
async fn test_defaults_untouched_without_save_info() {
    let store = store();
    let notifier = RecordingNotifier::default();
    let profile = store.insert_profile(UserId::new(7), "ada");

    let mut paid = payment(&tote_bag(), "22.00");
    paid.username = Some("ada".to_string());

    let outcome = WebhookReconciler::new(&store, &notifier, retry())
        .reconcile(&paid)
        .await
        .unwrap();

    assert_eq!(outcome.order().user_profile_id, Some(profile.id));
    assert!(store.profile(profile.id).unwrap().defaults.phone_number.is_none());
}

#[tokio::test]
async fn test_unknown_username_is_treated_as_guest() {
    let store = store();
    let notifier = RecordingNotifier::default();

    let mut paid = payment(&tote_bag(), "22.00");
    paid.username = Some("ghost".to_string());
    paid.save_info = true;

    let outcome = WebhookReconciler::new(&store, &notifier, retry())
        .reconcile(&paid)
        .await
        .unwrap();

    assert!(outcome.order().user_profile_id.is_none());
}

// =============================================================================
// Totals
// =============================================================================

#[tokio::test]
async fn test_totals_follow_line_item_changes() {
    let store = store();
    let created = checkout(&store, &tote_bag()).await.into_order();
    let item = store.line_items(created.id).await.unwrap().remove(0);

    // 6 totes: 60.00, free delivery.
    let order = store.update_line_item_quantity(item.id, 6).await.unwrap();
    assert_eq!(order.order_total, Decimal::new(6000, 2));
    assert_eq!(order.delivery_cost, Decimal::ZERO);
    assert_eq!(order.grand_total, Decimal::new(6000, 2));

    // 1 tote: 10.00 plus 1.00 delivery.
    let order = store.update_line_item_quantity(item.id, 1).await.unwrap();
    assert_eq!(order.grand_total, Decimal::new(1100, 2));

    let order = store.delete_line_item(item.id).await.unwrap();
    assert_eq!(order.order_total, Decimal::ZERO);
    assert_eq!(order.grand_total, Decimal::ZERO);
}

#[tokio::test]
async fn test_empty_bag_cannot_become_an_order() {
    let store = store();
    let order = NewOrder::new(shipping(), "{}".to_string(), PID.to_string(), OrderOrigin::Checkout);

    let err = OrderMaterializer::new(&store)
        .materialize(&order, &Bag::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::EmptyBag));
    assert!(store.orders().is_empty());
}
