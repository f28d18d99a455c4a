//! Payment webhook reconciliation.
//!
//! A successful payment is reported twice: by the browser submitting the
//! checkout form and by Stripe's `payment_intent.succeeded` webhook. The
//! webhook waits for the checkout request to store the order, polling with
//! [`WebhookRetryConfig`], and builds the order itself only when none shows
//! up. A customer whose browser died after paying still gets an order.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use kestrel_core::{
    Bag, BagError, Email, OrderOrigin, ShippingDetails, from_minor_units, non_empty,
};

use crate::config::WebhookRetryConfig;
use crate::db::{OrderStore, ProductCatalog, ProfileStore, RepositoryError};
use crate::models::{NewOrder, Order, OrderMatch, ProfileDefaults};
use crate::services::checkout::{CheckoutError, MaterializeOutcome, OrderMaterializer};
use crate::services::email::OrderNotifier;
use crate::stripe::{Charge, PaymentIntent};

/// Metadata keys written onto the payment intent before confirmation.
pub mod metadata {
    pub const BAG: &str = "bag";
    pub const SAVE_INFO: &str = "save_info";
    pub const USERNAME: &str = "username";
}

/// Username recorded for guests.
pub const ANONYMOUS_USERNAME: &str = "AnonymousUser";

/// Errors from reconciling a payment.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("payment notification is incomplete: {0}")]
    InvalidPayment(String),

    #[error("bag metadata is invalid: {0}")]
    Bag(#[from] BagError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// What the webhook did for a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Checkout had already stored the order; found on the given attempt.
    Matched { order: Order, attempts: u32 },
    /// No matching order appeared, so the webhook created one.
    Created { order: Order },
    /// An order for this payment intent exists but differs from the
    /// notification; it was left as is.
    AlreadyRecorded { order: Order },
}

impl ReconcileOutcome {
    #[must_use]
    pub fn order(&self) -> &Order {
        match self {
            Self::Matched { order, .. }
            | Self::Created { order }
            | Self::AlreadyRecorded { order } => order,
        }
    }
}

/// A succeeded payment as reported by Stripe.
#[derive(Debug, Clone)]
pub struct PaymentNotification {
    pub stripe_pid: String,
    /// Bag snapshot from the intent metadata.
    pub bag: String,
    pub save_info: bool,
    /// Signed-in customer, `None` for guests.
    pub username: Option<String>,
    pub shipping: ShippingDetails,
    /// Charged amount in major units.
    pub grand_total: Decimal,
}

impl PaymentNotification {
    /// Combine a payment intent with its charge.
    ///
    /// Delivery details come from the intent's shipping block, contact email
    /// from the charge's billing details, and the grand total from the
    /// charged amount.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::InvalidPayment` if the bag metadata or a
    /// usable billing email is missing.
    pub fn from_stripe(intent: &PaymentIntent, charge: &Charge) -> Result<Self, ReconcileError> {
        let bag = intent
            .metadata
            .get(metadata::BAG)
            .cloned()
            .ok_or_else(|| ReconcileError::InvalidPayment("no bag metadata".to_string()))?;
        let save_info = intent
            .metadata
            .get(metadata::SAVE_INFO)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let username = intent
            .metadata
            .get(metadata::USERNAME)
            .map(|u| u.trim())
            .filter(|u| !u.is_empty() && *u != ANONYMOUS_USERNAME)
            .map(str::to_owned);

        let billing = &charge.billing_details;
        let email = billing
            .email
            .as_deref()
            .ok_or_else(|| ReconcileError::InvalidPayment("no billing email".to_string()))
            .and_then(|e| {
                Email::parse(e).map_err(|err| ReconcileError::InvalidPayment(err.to_string()))
            })?;

        let shipping = intent.shipping.clone().unwrap_or_default();
        let address = &shipping.address;
        let text = |value: Option<&str>| non_empty(value).unwrap_or_default();

        let shipping = ShippingDetails {
            full_name: text(shipping.name.as_deref().or(billing.name.as_deref())),
            email,
            phone_number: text(shipping.phone.as_deref().or(billing.phone.as_deref())),
            country: text(address.country.as_deref()),
            postcode: non_empty(address.postal_code.as_deref()),
            town_or_city: text(address.city.as_deref()),
            street_address1: text(address.line1.as_deref()),
            street_address2: non_empty(address.line2.as_deref()),
            county: non_empty(address.state.as_deref()),
        };

        Ok(Self {
            stripe_pid: intent.id.clone(),
            bag,
            save_info,
            username,
            shipping,
            grand_total: from_minor_units(charge.amount),
        })
    }

    fn match_key(&self) -> OrderMatch {
        OrderMatch {
            shipping: self.shipping.clone(),
            grand_total: self.grand_total,
            original_bag: self.bag.clone(),
            stripe_pid: self.stripe_pid.clone(),
        }
    }
}

/// Reconciles succeeded payments with stored orders.
pub struct WebhookReconciler<'a, S, N> {
    store: &'a S,
    notifier: &'a N,
    retry: WebhookRetryConfig,
}

impl<'a, S, N> WebhookReconciler<'a, S, N>
where
    S: ProductCatalog + OrderStore + ProfileStore,
    N: OrderNotifier,
{
    #[must_use]
    pub const fn new(store: &'a S, notifier: &'a N, retry: WebhookRetryConfig) -> Self {
        Self {
            store,
            notifier,
            retry,
        }
    }

    /// Make sure exactly one order exists for a succeeded payment.
    ///
    /// Saved delivery defaults are updated first when the customer asked for
    /// it. The store is then polled for an order matching the notification;
    /// after the last miss the order is built from the bag snapshot. The
    /// customer is emailed in every successful case except a stored order
    /// that still has no line items; a failed email is logged and does not
    /// fail reconciliation.
    ///
    /// # Errors
    ///
    /// Returns an error if the bag cannot be parsed or the order cannot be
    /// written. A partially written order has been deleted by then.
    #[instrument(skip_all, fields(stripe_pid = %payment.stripe_pid))]
    pub async fn reconcile(
        &self,
        payment: &PaymentNotification,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let profile = match &payment.username {
            Some(username) => {
                let profile = self.store.get_profile_by_username(username).await?;
                if profile.is_none() {
                    warn!(username = %username, "No profile for paying user");
                }
                profile
            }
            None => None,
        };

        if let Some(profile) = profile.as_ref().filter(|_| payment.save_info) {
            self.store
                .update_defaults(profile.id, &ProfileDefaults::from(&payment.shipping))
                .await?;
            debug!(profile_id = %profile.id, "Saved delivery defaults");
        }

        let key = payment.match_key();
        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(order) = self.store.find_matching(&key).await? {
                info!(order_number = %order.order_number, attempt, "Order found in database");
                let outcome = ReconcileOutcome::Matched {
                    order,
                    attempts: attempt,
                };
                self.notify(outcome.order()).await;
                return Ok(outcome);
            }
            if attempt < attempts {
                tokio::time::sleep(self.retry.delay).await;
            }
        }

        info!(attempts, "No matching order; creating from webhook");
        let bag = Bag::from_snapshot(&payment.bag)?;
        let order = NewOrder::new(
            payment.shipping.clone(),
            payment.bag.clone(),
            payment.stripe_pid.clone(),
            OrderOrigin::Webhook,
        )
        .with_profile(profile.map(|p| p.id));

        let outcome = match OrderMaterializer::new(self.store).materialize(&order, &bag).await? {
            MaterializeOutcome::Created(order) => ReconcileOutcome::Created { order },
            MaterializeOutcome::Existing(order) => {
                warn!(
                    order_number = %order.order_number,
                    "Stored order differs from payment notification"
                );
                ReconcileOutcome::AlreadyRecorded {
                    order: self.settled(order).await?,
                }
            }
        };

        if outcome.order().grand_total.is_zero() {
            warn!(
                order_number = %outcome.order().order_number,
                "Stored order has no line items yet; confirmation skipped"
            );
        } else {
            self.notify(outcome.order()).await;
        }
        Ok(outcome)
    }

    /// Re-read an order that checkout may still be filling.
    ///
    /// An order without totals gets one more read after the retry delay. An
    /// order that vanished in between was rolled back by checkout.
    async fn settled(&self, order: Order) -> Result<Order, ReconcileError> {
        if !order.grand_total.is_zero() {
            return Ok(order);
        }
        tokio::time::sleep(self.retry.delay).await;
        let order = self
            .store
            .get_by_number(&order.order_number)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(order)
    }

    async fn notify(&self, order: &Order) {
        let items = match self.store.line_items(order.id).await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, order_number = %order.order_number, "Failed to load line items for confirmation");
                return;
            }
        };

        if let Err(e) = self.notifier.send_confirmation(order, &items).await {
            error!(error = %e, order_number = %order.order_number, "Failed to send order confirmation");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::stripe::{Address, BillingDetails, Shipping};

    fn intent(metadata: &[(&str, &str)]) -> PaymentIntent {
        PaymentIntent {
            id: "pi_123".into(),
            amount: 2200,
            currency: "usd".into(),
            client_secret: None,
            metadata: metadata
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<HashMap<_, _>>(),
            shipping: Some(Shipping {
                name: Some("Ada Lovelace".into()),
                phone: Some("0123456789".into()),
                address: Address {
                    line1: Some("1 Main Street".into()),
                    line2: Some(String::new()),
                    city: Some("Dublin".into()),
                    state: Some("Dublin".into()),
                    postal_code: None,
                    country: Some("IE".into()),
                },
            }),
            latest_charge: Some("ch_1".into()),
        }
    }

    fn charge(email: Option<&str>) -> Charge {
        Charge {
            id: "ch_1".into(),
            amount: 2200,
            billing_details: BillingDetails {
                email: email.map(str::to_owned),
                ..BillingDetails::default()
            },
        }
    }

    #[test]
    fn test_notification_from_stripe() {
        let intent = intent(&[
            ("bag", r#"{"1":2}"#),
            ("save_info", "true"),
            ("username", "ada"),
        ]);
        let payment = PaymentNotification::from_stripe(&intent, &charge(Some("ada@example.com")))
            .unwrap();

        assert_eq!(payment.stripe_pid, "pi_123");
        assert_eq!(payment.grand_total, Decimal::new(2200, 2));
        assert!(payment.save_info);
        assert_eq!(payment.username.as_deref(), Some("ada"));
        assert_eq!(payment.shipping.street_address2, None);
        assert_eq!(payment.shipping.postcode, None);
        assert_eq!(payment.shipping.county.as_deref(), Some("Dublin"));
        assert_eq!(payment.shipping.email.as_str(), "ada@example.com");
    }

    #[test]
    fn test_anonymous_user_has_no_username() {
        let intent = intent(&[
            ("bag", "{}"),
            ("save_info", "false"),
            ("username", ANONYMOUS_USERNAME),
        ]);
        let payment = PaymentNotification::from_stripe(&intent, &charge(Some("ada@example.com")))
            .unwrap();
        assert_eq!(payment.username, None);
        assert!(!payment.save_info);
    }

    #[test]
    fn test_missing_bag_or_email_is_rejected() {
        let without_bag = intent(&[("username", "ada")]);
        assert!(matches!(
            PaymentNotification::from_stripe(&without_bag, &charge(Some("ada@example.com"))),
            Err(ReconcileError::InvalidPayment(_))
        ));

        let with_bag = intent(&[("bag", "{}")]);
        assert!(matches!(
            PaymentNotification::from_stripe(&with_bag, &charge(None)),
            Err(ReconcileError::InvalidPayment(_))
        ));
    }
}
