//! Bag pricing.
//!
//! [`DeliveryPolicy`] turns a subtotal into delivery cost and grand total.
//! The same policy is used for the live bag view and for order totals
//! recomputed from line items, so both always agree.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::bag::Bag;
use crate::catalog::Product;
use crate::types::{ProductId, round_money};

/// Delivery pricing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Subtotals at or above this ship free.
    pub free_delivery_threshold: Decimal,
    /// Delivery cost as a percentage of the subtotal, e.g. `10` for 10%.
    pub standard_delivery_percentage: Decimal,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            free_delivery_threshold: Decimal::new(50, 0),
            standard_delivery_percentage: Decimal::new(10, 0),
        }
    }
}

impl DeliveryPolicy {
    /// Delivery cost for a subtotal.
    #[must_use]
    pub fn delivery_cost(&self, subtotal: Decimal) -> Decimal {
        if subtotal < self.free_delivery_threshold {
            round_money(subtotal * self.standard_delivery_percentage / Decimal::ONE_HUNDRED)
        } else {
            Decimal::ZERO
        }
    }

    /// How much more the customer must spend to qualify for free delivery.
    #[must_use]
    pub fn free_delivery_delta(&self, subtotal: Decimal) -> Decimal {
        (self.free_delivery_threshold - subtotal).max(Decimal::ZERO)
    }

    /// Subtotal plus delivery.
    #[must_use]
    pub fn grand_total(&self, subtotal: Decimal) -> Decimal {
        subtotal + self.delivery_cost(subtotal)
    }
}

/// The bag references products that no longer exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("products not found: {0:?}")]
pub struct MissingProducts(pub Vec<ProductId>);

/// One priced line of the bag view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BagLine {
    pub product: Product,
    pub quantity: u32,
    pub size: Option<String>,
    pub line_total: Decimal,
}

/// The priced view of a bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BagContext {
    pub lines: Vec<BagLine>,
    pub subtotal: Decimal,
    /// Total units in the bag.
    pub product_count: u64,
    pub delivery: Decimal,
    pub free_delivery_delta: Decimal,
    pub free_delivery_threshold: Decimal,
    pub grand_total: Decimal,
}

impl BagContext {
    /// Price every bag entry against current catalog data.
    ///
    /// Sized entries produce one line per size, in size-label order.
    ///
    /// # Errors
    ///
    /// Returns [`MissingProducts`] listing every bag product ID absent from
    /// `products`. Nothing is priced in that case.
    pub fn build(
        bag: &Bag,
        products: &HashMap<ProductId, Product>,
        policy: &DeliveryPolicy,
    ) -> Result<Self, MissingProducts> {
        let missing: Vec<ProductId> = bag
            .product_ids()
            .into_iter()
            .filter(|id| !products.contains_key(id))
            .collect();
        if !missing.is_empty() {
            return Err(MissingProducts(missing));
        }

        let mut lines = Vec::new();
        let mut subtotal = Decimal::ZERO;
        let mut product_count = 0_u64;

        for (id, entry) in bag.iter() {
            let Some(product) = products.get(&id) else {
                continue;
            };
            for (size, quantity) in entry.lines() {
                let line_total = product.price * Decimal::from(quantity);
                subtotal += line_total;
                product_count += u64::from(quantity);
                lines.push(BagLine {
                    product: product.clone(),
                    quantity,
                    size: size.map(str::to_owned),
                    line_total,
                });
            }
        }

        let delivery = policy.delivery_cost(subtotal);
        Ok(Self {
            lines,
            subtotal,
            product_count,
            delivery,
            free_delivery_delta: policy.free_delivery_delta(subtotal),
            free_delivery_threshold: policy.free_delivery_threshold,
            grand_total: subtotal + delivery,
        })
    }
}
