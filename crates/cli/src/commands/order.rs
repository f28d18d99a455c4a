//! Order inspection and correction.
//!
//! Order totals are derived from line items and recomputed by the repository
//! on every line-item write, so they are never edited directly.

use tracing::info;

use kestrel_core::{LineItemId, OrderNumber};
use kestrel_storefront::config::delivery_policy_from_env;
use kestrel_storefront::db::OrderRepository;
use kestrel_storefront::models::Order;

use super::connect;

/// Print an order and its line items.
///
/// # Errors
///
/// Returns an error if the order does not exist or a query fails.
pub async fn show(order_number: &str) -> Result<(), Box<dyn std::error::Error>> {
    let pool = connect().await?;
    let repo = OrderRepository::new(&pool, delivery_policy_from_env()?);

    let order = repo
        .get_by_number(&OrderNumber::new(order_number.trim()))
        .await?
        .ok_or_else(|| format!("Order not found: {order_number}"))?;
    let items = repo.line_items(order.id).await?;

    log_order(&order);
    info!("Line items:");
    for item in &items {
        info!(
            "  #{} {} {} x {} = {}",
            item.id,
            item.product_name,
            item.product_size.as_deref().map_or_else(String::new, |s| format!("({})", s.to_uppercase())),
            item.quantity,
            item.lineitem_total
        );
    }
    Ok(())
}

/// Change a line item's quantity. Zero deletes the line item.
///
/// # Errors
///
/// Returns an error if the line item does not exist or a query fails.
pub async fn set_item_quantity(
    line_item_id: LineItemId,
    quantity: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let pool = connect().await?;
    let repo = OrderRepository::new(&pool, delivery_policy_from_env()?);

    let order = if quantity == 0 {
        info!(line_item_id = %line_item_id, "Deleting line item");
        repo.delete_line_item(line_item_id).await?
    } else {
        info!(line_item_id = %line_item_id, quantity, "Updating line item");
        repo.update_line_item_quantity(line_item_id, quantity).await?
    };

    log_order(&order);
    Ok(())
}

fn log_order(order: &Order) {
    let s = &order.shipping;
    info!("Order {}", order.order_number);
    info!("  Date: {}", order.date.format("%Y-%m-%d %H:%M"));
    info!("  Origin: {}", order.origin);
    info!("  Customer: {} <{}> {}", s.full_name, s.email, s.phone_number);
    info!(
        "  Address: {}, {}, {} {}",
        s.street_address1,
        s.town_or_city,
        s.postcode.as_deref().unwrap_or(""),
        s.country
    );
    info!("  Payment intent: {}", order.stripe_pid);
    info!("  Order total: {}", order.order_total);
    info!("  Delivery: {}", order.delivery_cost);
    info!("  Grand total: {}", order.grand_total);
}
