//! Order materialization.
//!
//! Turns a bag snapshot plus delivery details into a persisted order with
//! line items. Checkout and the payment webhook both go through
//! [`OrderMaterializer`], so an order looks the same whichever path wrote it.

use thiserror::Error;
use tracing::{error, info, instrument};

use kestrel_core::{Bag, BagError, ProductId};

use crate::db::{OrderStore, ProductCatalog, RepositoryError};
use crate::models::{NewLineItem, NewOrder, Order, OrderInsert};

/// Errors that abort materialization. Any partially written order has been
/// deleted by the time one of these is returned.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("bag is empty")]
    EmptyBag,

    #[error("product {0} in the bag no longer exists")]
    ProductMissing(ProductId),

    #[error("invalid bag: {0}")]
    Bag(#[from] BagError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// How an order came to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// This call wrote the order and its line items.
    Created(Order),
    /// An order for the same payment intent was already stored; nothing was
    /// written.
    Existing(Order),
}

impl MaterializeOutcome {
    #[must_use]
    pub fn order(&self) -> &Order {
        match self {
            Self::Created(order) | Self::Existing(order) => order,
        }
    }

    #[must_use]
    pub fn into_order(self) -> Order {
        match self {
            Self::Created(order) | Self::Existing(order) => order,
        }
    }
}

/// Writes orders from bags.
pub struct OrderMaterializer<'a, S> {
    store: &'a S,
}

impl<'a, S> OrderMaterializer<'a, S>
where
    S: ProductCatalog + OrderStore,
{
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Persist `order` and one line item per bag line.
    ///
    /// Totals are recomputed by the store as line items are added, so the
    /// returned order carries final totals.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::ProductMissing` if a bag product has left the
    /// catalog, `CheckoutError::Bag` if a line's size does not fit its
    /// product, or the underlying store error. The order row is deleted
    /// before either is returned.
    #[instrument(skip(self, order, bag), fields(order_number = %order.order_number, origin = ?order.origin))]
    pub async fn materialize(
        &self,
        order: &NewOrder,
        bag: &Bag,
    ) -> Result<MaterializeOutcome, CheckoutError> {
        if bag.is_empty() {
            return Err(CheckoutError::EmptyBag);
        }

        let order = match self.store.create_order(order).await? {
            OrderInsert::Created(order) => order,
            OrderInsert::Existing(order) => {
                info!(
                    existing = %order.order_number,
                    stripe_pid = %order.stripe_pid,
                    "Order already stored for payment intent"
                );
                return Ok(MaterializeOutcome::Existing(order));
            }
        };

        match self.fill(&order, bag).await {
            Ok(order) => {
                info!(grand_total = %order.grand_total, "Order created");
                Ok(MaterializeOutcome::Created(order))
            }
            Err(e) => {
                if let Err(cleanup) = self.store.delete_order(order.id).await {
                    error!(
                        error = %cleanup,
                        order_id = %order.id,
                        "Failed to delete partially written order"
                    );
                }
                Err(e)
            }
        }
    }

    async fn fill(&self, order: &Order, bag: &Bag) -> Result<Order, CheckoutError> {
        let products = self.store.get_products(&bag.product_ids()).await?;

        for (product_id, entry) in bag.iter() {
            let product = products
                .get(&product_id)
                .ok_or(CheckoutError::ProductMissing(product_id))?;
            for (size, quantity) in entry.lines() {
                let size = product.select_size(size)?;
                let item = NewLineItem::for_product(product, quantity, size);
                self.store.add_line_item(order.id, &item).await?;
            }
        }

        let order = self
            .store
            .get_by_number(&order.order_number)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(order)
    }
}
