//! The session-held bag.
//!
//! The bag is read from the session whole, changed through
//! [`kestrel_core::Bag`]'s operations and written back whole.

use kestrel_core::{Bag, BagChange, BagContext, DeliveryPolicy, MissingProducts};
use tower_sessions::Session;
use tracing::warn;

use crate::db::ProductCatalog;
use crate::error::AppError;
use crate::models::{FlashMessage, session_keys};
use crate::services::flash;

/// Read the bag from the session. A missing or unreadable bag is empty.
pub async fn load(session: &Session) -> Bag {
    match session.get::<Bag>(session_keys::BAG).await {
        Ok(bag) => bag.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Discarding unreadable bag");
            Bag::new()
        }
    }
}

/// Overwrite the session bag.
///
/// # Errors
///
/// Returns an error if the session cannot be written.
pub async fn save(session: &Session, bag: &Bag) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::BAG, bag).await
}

/// Remove the bag from the session.
///
/// # Errors
///
/// Returns an error if the session cannot be written.
pub async fn clear(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.remove::<Bag>(session_keys::BAG).await?;
    Ok(())
}

/// User-facing message for a bag change.
#[must_use]
pub fn change_message(change: &BagChange, product_name: &str) -> FlashMessage {
    match change {
        BagChange::Added { size: None } => {
            FlashMessage::success(format!("Added {product_name} to your bag"))
        }
        BagChange::Added { size: Some(size) } => FlashMessage::success(format!(
            "Added size {} {product_name} to your bag",
            size.to_uppercase()
        )),
        BagChange::Updated {
            size: None,
            quantity,
        } => FlashMessage::success(format!("Updated {product_name} quantity to {quantity}")),
        BagChange::Updated {
            size: Some(size),
            quantity,
        } => FlashMessage::success(format!(
            "Updated size {} {product_name} quantity to {quantity}",
            size.to_uppercase()
        )),
        BagChange::Removed { size: None } => {
            FlashMessage::success(format!("Removed {product_name} from your bag"))
        }
        BagChange::Removed { size: Some(size) } => FlashMessage::success(format!(
            "Removed size {} {product_name} from your bag",
            size.to_uppercase()
        )),
    }
}

/// Load the session bag and price it.
///
/// Entries whose product has left the catalog are removed from the session
/// bag and the customer is told how many were dropped.
///
/// # Errors
///
/// Returns an error if the catalog lookup or a session write fails.
pub async fn load_context<C: ProductCatalog>(
    session: &Session,
    catalog: &C,
    policy: &DeliveryPolicy,
) -> Result<(Bag, BagContext), AppError> {
    let mut bag = load(session).await;
    let products = catalog.get_products(&bag.product_ids()).await?;

    match BagContext::build(&bag, &products, policy) {
        Ok(context) => Ok((bag, context)),
        Err(MissingProducts(missing)) => {
            warn!(products = ?missing, "Pruning unavailable products from bag");
            bag.retain_products(|id| products.contains_key(&id));
            save(session, &bag).await?;

            let removed = missing.len();
            let noun = if removed == 1 { "item" } else { "items" };
            flash::push(
                session,
                FlashMessage::warning(format!(
                    "{removed} {noun} in your bag {} no longer available and {} removed.",
                    if removed == 1 { "is" } else { "are" },
                    if removed == 1 { "was" } else { "were" },
                )),
            )
            .await?;

            let context = BagContext::build(&bag, &products, policy).map_err(|e| {
                AppError::Internal(format!("bag still references missing products: {e}"))
            })?;
            Ok((bag, context))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_messages() {
        let name = "Slim Jeans";
        assert_eq!(
            change_message(&BagChange::Added { size: None }, name).text,
            "Added Slim Jeans to your bag"
        );
        assert_eq!(
            change_message(
                &BagChange::Updated {
                    size: Some("m".into()),
                    quantity: 3
                },
                name
            )
            .text,
            "Updated size M Slim Jeans quantity to 3"
        );
        assert_eq!(
            change_message(&BagChange::Removed { size: Some("xl".into()) }, name).text,
            "Removed size XL Slim Jeans from your bag"
        );
        assert_eq!(
            change_message(
                &BagChange::Updated {
                    size: None,
                    quantity: 4
                },
                name
            )
            .text,
            "Updated Slim Jeans quantity to 4"
        );
    }
}
