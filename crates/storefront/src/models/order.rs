//! Orders and line items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use kestrel_core::{
    LineItemId, OrderId, OrderNumber, OrderOrigin, Product, ProductId, ProfileId, ShippingDetails,
};

/// A persisted order.
///
/// Totals are derived from the line items and only change through the order
/// store's line-item operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub user_profile_id: Option<ProfileId>,
    pub shipping: ShippingDetails,
    pub date: DateTime<Utc>,
    pub delivery_cost: Decimal,
    pub order_total: Decimal,
    pub grand_total: Decimal,
    /// Bag snapshot the order was built from.
    pub original_bag: String,
    /// Stripe payment intent ID.
    pub stripe_pid: String,
    pub origin: OrderOrigin,
}

/// One product/size/quantity row of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLineItem {
    pub id: LineItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_size: Option<String>,
    pub quantity: u32,
    /// `quantity * unit price` at the time the line was written.
    pub lineitem_total: Decimal,
}

/// Input for creating an order row. Totals start at zero.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub user_profile_id: Option<ProfileId>,
    pub shipping: ShippingDetails,
    pub original_bag: String,
    pub stripe_pid: String,
    pub origin: OrderOrigin,
}

impl NewOrder {
    /// Build an order with a freshly generated order number.
    #[must_use]
    pub fn new(
        shipping: ShippingDetails,
        original_bag: String,
        stripe_pid: String,
        origin: OrderOrigin,
    ) -> Self {
        Self {
            order_number: OrderNumber::generate(),
            user_profile_id: None,
            shipping,
            original_bag,
            stripe_pid,
            origin,
        }
    }

    /// Attach the order to a profile at creation time.
    #[must_use]
    pub const fn with_profile(mut self, profile_id: Option<ProfileId>) -> Self {
        self.user_profile_id = profile_id;
        self
    }
}

/// Result of inserting an order.
///
/// Orders are unique per payment intent. When another request already
/// stored an order for the same `stripe_pid`, that order is returned instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderInsert {
    Created(Order),
    Existing(Order),
}

impl OrderInsert {
    /// The stored order, whichever request created it.
    #[must_use]
    pub fn into_order(self) -> Order {
        match self {
            Self::Created(order) | Self::Existing(order) => order,
        }
    }
}

/// Input for a new line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLineItem {
    pub product_id: ProductId,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub product_size: Option<String>,
}

impl NewLineItem {
    #[must_use]
    pub fn for_product(product: &Product, quantity: u32, product_size: Option<&str>) -> Self {
        Self {
            product_id: product.id,
            unit_price: product.price,
            quantity,
            product_size: product_size.map(str::to_owned),
        }
    }

    /// Line subtotal.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Fields the webhook compares when looking for an order created by checkout.
///
/// Text fields compare case-insensitively; absent optional fields only match
/// absent fields.
#[derive(Debug, Clone)]
pub struct OrderMatch {
    pub shipping: ShippingDetails,
    pub grand_total: Decimal,
    pub original_bag: String,
    pub stripe_pid: String,
}

impl OrderMatch {
    /// Whether a stored order satisfies every match field.
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        fn eq(a: &str, b: &str) -> bool {
            a.to_lowercase() == b.to_lowercase()
        }
        fn eq_opt(a: Option<&str>, b: Option<&str>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => eq(a, b),
                (None, None) => true,
                _ => false,
            }
        }

        let want = &self.shipping;
        let have = &order.shipping;
        eq(&want.full_name, &have.full_name)
            && eq(want.email.as_str(), have.email.as_str())
            && eq(&want.phone_number, &have.phone_number)
            && eq(&want.country, &have.country)
            && eq_opt(want.postcode.as_deref(), have.postcode.as_deref())
            && eq(&want.town_or_city, &have.town_or_city)
            && eq(&want.street_address1, &have.street_address1)
            && eq_opt(
                want.street_address2.as_deref(),
                have.street_address2.as_deref(),
            )
            && eq_opt(want.county.as_deref(), have.county.as_deref())
            && self.grand_total == order.grand_total
            && eq(&self.original_bag, &order.original_bag)
            && eq(&self.stripe_pid, &order.stripe_pid)
    }
}
