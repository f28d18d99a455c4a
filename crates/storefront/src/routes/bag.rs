//! Bag route handlers.
//!
//! The bag lives in the session. Every change reads the whole bag, applies
//! one mutator operation and writes the whole bag back.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{instrument, warn};

use kestrel_core::{BagContext, CurrencyCode, Product, ProductId, non_empty};

use super::page::{PageContext, ProductView};
use crate::db::ProductCatalog;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::OptionalAuth;
use crate::models::FlashMessage;
use crate::services::{bag, flash};
use crate::state::AppState;

/// Bag line display data for templates.
#[derive(Clone)]
pub struct BagLineView {
    pub product: ProductView,
    pub size: Option<String>,
    pub quantity: u32,
    pub line_total: String,
}

/// Priced bag display data for templates.
#[derive(Clone)]
pub struct BagView {
    pub lines: Vec<BagLineView>,
    pub subtotal: String,
    pub delivery: String,
    pub free_delivery_delta: Option<String>,
    pub free_delivery_threshold: String,
    pub grand_total: String,
}

impl BagView {
    #[must_use]
    pub fn new(context: &BagContext, currency: CurrencyCode) -> Self {
        Self {
            lines: context
                .lines
                .iter()
                .map(|line| BagLineView {
                    product: ProductView::new(&line.product, currency),
                    size: line.size.clone(),
                    quantity: line.quantity,
                    line_total: currency.format(line.line_total),
                })
                .collect(),
            subtotal: currency.format(context.subtotal),
            delivery: currency.format(context.delivery),
            free_delivery_delta: (!context.free_delivery_delta.is_zero())
                .then(|| currency.format(context.free_delivery_delta)),
            free_delivery_threshold: currency.format(context.free_delivery_threshold),
            grand_total: currency.format(context.grand_total),
        }
    }
}

/// Bag page template.
#[derive(Template, WebTemplate)]
#[template(path = "bag/show.html")]
pub struct BagShowTemplate {
    pub page: PageContext,
    pub bag: BagView,
}

/// Add to bag form data.
#[derive(Debug, Deserialize)]
pub struct AddToBagForm {
    pub quantity: String,
    pub product_size: Option<String>,
    pub redirect_url: Option<String>,
}

/// Adjust quantity form data.
#[derive(Debug, Deserialize)]
pub struct AdjustBagForm {
    pub quantity: String,
    pub product_size: Option<String>,
}

/// Remove from bag form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromBagForm {
    pub product_size: Option<String>,
}

/// Only same-site paths are followed after adding to the bag.
fn local_redirect(target: Option<&str>) -> &str {
    match target {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/products",
    }
}

async fn find_product(state: &AppState, product_id: ProductId) -> Result<Product> {
    state
        .store()
        .get_product(product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {product_id}")))
}

async fn product_name(state: &AppState, product_id: ProductId) -> Result<String> {
    Ok(find_product(state, product_id).await?.name)
}

/// Display the bag.
#[instrument(skip(state, session, user))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<BagShowTemplate> {
    let (_, context) =
        bag::load_context(&session, state.store(), &state.config().delivery).await?;
    let page = PageContext::with_bag(&state, &session, &context, user.as_ref()).await;

    Ok(BagShowTemplate {
        page,
        bag: BagView::new(&context, state.config().stripe.currency),
    })
}

/// Add a quantity of a product (and size) to the bag.
#[instrument(skip(state, session, form))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Path(product_id): Path<ProductId>,
    Form(form): Form<AddToBagForm>,
) -> Result<Redirect> {
    let product = find_product(&state, product_id).await?;
    let name = product.name.as_str();
    let redirect = Redirect::to(local_redirect(form.redirect_url.as_deref()));

    let Some(quantity) = form.quantity.trim().parse::<u32>().ok().filter(|q| *q > 0) else {
        flash::push(
            &session,
            FlashMessage::error("Please enter a quantity of at least 1."),
        )
        .await?;
        return Ok(redirect);
    };
    let size = match product.select_size(non_empty(form.product_size.as_deref()).as_deref()) {
        Ok(size) => size,
        Err(e) => {
            warn!(error = %e, "Rejected size selection");
            flash::push(&session, FlashMessage::error(format!("Could not add {name}: {e}")))
                .await?;
            return Ok(redirect);
        }
    };

    let mut current = bag::load(&session).await;
    match current.add(product_id, quantity, size) {
        Ok(change) => {
            bag::save(&session, &current).await?;
            let id = product_id.to_string();
            add_breadcrumb("bag", "Added product", Some(&[("product_id", id.as_str())]));
            flash::push(&session, bag::change_message(&change, name)).await?;
        }
        Err(e) => {
            warn!(error = %e, "Rejected bag addition");
            flash::push(&session, FlashMessage::error(format!("Could not add {name}: {e}")))
                .await?;
        }
    }

    Ok(redirect)
}

/// Set the quantity of a product (and size); zero or less removes it.
#[instrument(skip(state, session, form))]
pub async fn adjust(
    State(state): State<AppState>,
    session: Session,
    Path(product_id): Path<ProductId>,
    Form(form): Form<AdjustBagForm>,
) -> Result<Redirect> {
    let name = product_name(&state, product_id).await?;

    let Ok(quantity) = form.quantity.trim().parse::<i64>() else {
        flash::push(&session, FlashMessage::error("Please enter a whole number.")).await?;
        return Ok(Redirect::to("/bag"));
    };
    let size = non_empty(form.product_size.as_deref());

    let mut current = bag::load(&session).await;
    match current.adjust(product_id, quantity, size.as_deref()) {
        Ok(change) => {
            bag::save(&session, &current).await?;
            flash::push(&session, bag::change_message(&change, &name)).await?;
        }
        Err(e) => {
            warn!(error = %e, "Rejected bag adjustment");
            flash::push(
                &session,
                FlashMessage::error(format!("Could not update {name}: {e}")),
            )
            .await?;
        }
    }

    Ok(Redirect::to("/bag"))
}

/// Remove a product (or one size of it) from the bag.
///
/// Called from the bag page's script, which reloads the page afterwards, so
/// the outcome is reported through a flash message and a bare status code.
#[instrument(skip(state, session, form))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Path(product_id): Path<ProductId>,
    Form(form): Form<RemoveFromBagForm>,
) -> Response {
    let size = non_empty(form.product_size.as_deref());

    let result: Result<()> = async {
        let name = product_name(&state, product_id).await?;
        let mut current = bag::load(&session).await;
        let change = current
            .remove(product_id, size.as_deref())
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        bag::save(&session, &current).await?;
        flash::push(&session, bag::change_message(&change, &name)).await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to remove bag item");
            if let Err(flash_error) =
                flash::push(&session, FlashMessage::error(format!("Error removing item: {e}")))
                    .await
            {
                warn!(error = %flash_error, "Failed to queue removal error message");
            }
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
