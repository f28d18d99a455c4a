//! Values shared by every full-page template.

use tower_sessions::Session;

use kestrel_core::{BagContext, CurrencyCode, Product, ProductId};

use crate::error::Result;
use crate::models::{CurrentUser, FlashMessage};
use crate::services::{bag, flash};
use crate::state::AppState;

/// Layout data: queued messages and the header bag summary.
pub struct PageContext {
    pub messages: Vec<FlashMessage>,
    pub bag_total: String,
    pub bag_count: u64,
    pub username: Option<String>,
}

impl PageContext {
    /// Price the session bag for the header, then drain flash messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the bag cannot be priced.
    pub async fn load(
        state: &AppState,
        session: &Session,
        user: Option<&CurrentUser>,
    ) -> Result<Self> {
        let (_, context) =
            bag::load_context(session, state.store(), &state.config().delivery).await?;
        Ok(Self::with_bag(state, session, &context, user).await)
    }

    /// Build from an already priced bag.
    pub async fn with_bag(
        state: &AppState,
        session: &Session,
        context: &BagContext,
        user: Option<&CurrentUser>,
    ) -> Self {
        Self {
            messages: flash::take(session).await,
            bag_total: state.config().stripe.currency.format(context.grand_total),
            bag_count: context.product_count,
            username: user.map(|u| u.username.clone()),
        }
    }
}

/// Product card data for templates.
#[derive(Clone)]
pub struct ProductView {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: String,
    pub rating: Option<String>,
    pub image_url: Option<String>,
    pub has_sizes: bool,
}

impl ProductView {
    #[must_use]
    pub fn new(product: &Product, currency: CurrencyCode) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            description: product.description.clone(),
            price: currency.format(product.price),
            rating: product.rating.map(|r| format!("{r:.1}")),
            image_url: product.image_url.clone(),
            has_sizes: product.has_sizes,
        }
    }
}
