//! Checkout route handlers.
//!
//! # Flow
//!
//! 1. `GET /checkout` opens a Stripe payment intent for the bag's grand
//!    total and renders the delivery form with the intent's client secret.
//! 2. Before confirming the card payment, the page posts to
//!    `/checkout/cache_checkout_data`, which copies the bag snapshot, the
//!    save-info choice and the username onto the intent's metadata.
//! 3. After Stripe confirms the payment, the page submits the form to
//!    `POST /checkout`, which writes the order.
//! 4. Independently, Stripe calls the webhook (see [`super::webhook`]),
//!    which writes the order itself if step 3 never lands.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use kestrel_core::{OrderNumber, OrderOrigin, to_minor_units};

use super::bag::BagView;
use super::page::PageContext;
use crate::db::{OrderStore, ProfileStore};
use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::models::{
    CurrentUser, FlashMessage, NewOrder, Order, OrderLineItem, ProfileDefaults, session_keys,
};
use crate::services::webhook::{ANONYMOUS_USERNAME, metadata};
use crate::services::{
    CheckoutError, CheckoutForm, CheckoutFormError, OrderMaterializer, bag, flash,
};
use crate::state::AppState;
use crate::stripe::StripeError;

const EMPTY_BAG_MESSAGE: &str = "There's nothing in your bag right now";
const INVALID_FORM_MESSAGE: &str =
    "There was an error with your form. Please double check your information.";
const MISSING_PRODUCT_MESSAGE: &str = "One of the products in your bag wasn't found in our \
                                       database. Please call us for assistance!";
const PAYMENT_UNAVAILABLE_MESSAGE: &str =
    "Sorry, your payment cannot be processed right now. Please try again later.";

/// One rendered form input.
#[derive(Clone)]
pub struct FormField {
    pub name: &'static str,
    pub label: &'static str,
    pub input_type: &'static str,
    pub value: String,
    pub required: bool,
    pub max_length: usize,
    pub error: Option<String>,
}

fn form_fields(form: &CheckoutForm, errors: Option<&CheckoutFormError>) -> Vec<FormField> {
    let field = |name: &'static str,
                 label: &'static str,
                 input_type: &'static str,
                 value: &str,
                 required: bool,
                 max_length: usize| FormField {
        name,
        label,
        input_type,
        value: value.to_string(),
        required,
        max_length,
        error: errors
            .and_then(|e| e.message_for(name))
            .map(str::to_owned),
    };

    vec![
        field("full_name", "Full Name", "text", &form.full_name, true, 50),
        field("email", "Email Address", "email", &form.email, true, 254),
        field("phone_number", "Phone Number", "tel", &form.phone_number, true, 20),
        field("street_address1", "Street Address 1", "text", &form.street_address1, true, 80),
        field("street_address2", "Street Address 2", "text", &form.street_address2, false, 80),
        field("town_or_city", "Town or City", "text", &form.town_or_city, true, 40),
        field("county", "County, State or Locality", "text", &form.county, false, 80),
        field("postcode", "Postal Code", "text", &form.postcode, false, 20),
        field("country", "Country (two-letter code)", "text", &form.country, true, 40),
    ]
}

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/show.html")]
pub struct CheckoutTemplate {
    pub page: PageContext,
    pub bag: BagView,
    pub fields: Vec<FormField>,
    pub signed_in: bool,
    pub save_info: bool,
    pub stripe_public_key: String,
    pub client_secret: String,
}

/// Order line display data for templates.
#[derive(Clone)]
pub struct OrderLineView {
    pub name: String,
    pub size: Option<String>,
    pub quantity: u32,
    pub total: String,
}

/// Order summary display data for templates.
#[derive(Clone)]
pub struct OrderView {
    pub order: Order,
    pub date: String,
    pub lines: Vec<OrderLineView>,
    pub order_total: String,
    pub delivery: String,
    pub grand_total: String,
}

impl OrderView {
    fn new(order: Order, items: &[OrderLineItem], state: &AppState) -> Self {
        let currency = state.config().stripe.currency;
        Self {
            date: order.date.format("%d %b %Y, %H:%M").to_string(),
            lines: items
                .iter()
                .map(|item| OrderLineView {
                    name: item.product_name.clone(),
                    size: item.product_size.as_ref().map(|s| s.to_uppercase()),
                    quantity: item.quantity,
                    total: currency.format(item.lineitem_total),
                })
                .collect(),
            order_total: currency.format(order.order_total),
            delivery: currency.format(order.delivery_cost),
            grand_total: currency.format(order.grand_total),
            order,
        }
    }
}

/// Checkout success page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/success.html")]
pub struct CheckoutSuccessTemplate {
    pub page: PageContext,
    pub order: OrderView,
}

async fn prefilled_form(state: &AppState, user: Option<&CurrentUser>) -> Result<CheckoutForm> {
    let Some(user) = user else {
        return Ok(CheckoutForm::default());
    };
    let profile = state.store().get_or_create_profile(user).await?;
    Ok(CheckoutForm::prefilled(
        user.full_name.as_deref(),
        user.email.as_ref(),
        &profile.defaults,
    ))
}

/// Display the checkout page and open a payment intent.
#[instrument(skip(state, session, user))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Response> {
    let (current, context) =
        bag::load_context(&session, state.store(), &state.config().delivery).await?;
    if current.is_empty() {
        flash::push(&session, FlashMessage::error(EMPTY_BAG_MESSAGE)).await?;
        return Ok(Redirect::to("/products").into_response());
    }

    let amount = to_minor_units(context.grand_total)
        .ok_or_else(|| AppError::Internal("grand total does not fit in minor units".into()))?;
    let intent = state
        .stripe()
        .create_payment_intent(amount, state.config().stripe.currency)
        .await?;
    let client_secret = intent.client_secret.ok_or_else(|| {
        StripeError::Response("payment intent has no client secret".to_string())
    })?;

    let form = prefilled_form(&state, user.as_ref()).await?;
    let page = PageContext::with_bag(&state, &session, &context, user.as_ref()).await;

    Ok(CheckoutTemplate {
        page,
        bag: BagView::new(&context, state.config().stripe.currency),
        fields: form_fields(&form, None),
        signed_in: user.is_some(),
        save_info: true,
        stripe_public_key: state.config().stripe.public_key.clone(),
        client_secret,
    }
    .into_response())
}

/// Copy the bag and customer choices onto the payment intent.
///
/// The webhook relies on this metadata to rebuild the order when the
/// checkout submission never arrives.
#[instrument(skip(state, session, user, form))]
pub async fn cache_checkout_data(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<CheckoutForm>,
) -> Response {
    let result: Result<()> = async {
        let pid = form
            .payment_intent_id()
            .ok_or_else(|| AppError::BadRequest("missing client secret".to_string()))?;
        let snapshot = bag::load(&session).await.to_snapshot();
        let save_info = if form.wants_save_info() { "true" } else { "false" };
        let username = user
            .as_ref()
            .map_or(ANONYMOUS_USERNAME, |u| u.username.as_str());

        state
            .stripe()
            .update_payment_intent_metadata(
                pid,
                &[
                    (metadata::BAG, snapshot.as_str()),
                    (metadata::SAVE_INFO, save_info),
                    (metadata::USERNAME, username),
                ],
            )
            .await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to cache checkout data");
            if let Err(flash_error) =
                flash::push(&session, FlashMessage::error(PAYMENT_UNAVAILABLE_MESSAGE)).await
            {
                warn!(error = %flash_error, "Failed to queue payment error message");
            }
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

/// Handle the submitted checkout form.
#[instrument(skip(state, session, user, form))]
pub async fn submit(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<CheckoutForm>,
) -> Result<Response> {
    let current = bag::load(&session).await;
    if current.is_empty() {
        flash::push(&session, FlashMessage::error(EMPTY_BAG_MESSAGE)).await?;
        return Ok(Redirect::to("/products").into_response());
    }

    let pid = form
        .payment_intent_id()
        .ok_or_else(|| AppError::BadRequest("missing client secret".to_string()))?
        .to_string();

    let shipping = match form.validate() {
        Ok(shipping) => shipping,
        Err(errors) => {
            info!(fields = errors.fields.len(), "Checkout form rejected");
            flash::push(&session, FlashMessage::error(INVALID_FORM_MESSAGE)).await?;

            let (_, context) =
                bag::load_context(&session, state.store(), &state.config().delivery).await?;
            let page = PageContext::with_bag(&state, &session, &context, user.as_ref()).await;
            return Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                CheckoutTemplate {
                    page,
                    bag: BagView::new(&context, state.config().stripe.currency),
                    fields: form_fields(&form, Some(&errors)),
                    signed_in: user.is_some(),
                    save_info: form.wants_save_info(),
                    stripe_public_key: state.config().stripe.public_key.clone(),
                    client_secret: form.client_secret.clone(),
                },
            )
                .into_response());
        }
    };

    let order = NewOrder::new(shipping, current.to_snapshot(), pid, OrderOrigin::Checkout);
    match OrderMaterializer::new(state.store())
        .materialize(&order, &current)
        .await
    {
        Ok(outcome) => {
            session
                .insert(session_keys::SAVE_INFO, form.wants_save_info())
                .await?;
            let number = &outcome.order().order_number;
            Ok(Redirect::to(&format!("/checkout/checkout_success/{number}")).into_response())
        }
        Err(CheckoutError::ProductMissing(product_id)) => {
            warn!(product_id = %product_id, "Checkout aborted: product missing");
            flash::push(&session, FlashMessage::error(MISSING_PRODUCT_MESSAGE)).await?;
            Ok(Redirect::to("/bag").into_response())
        }
        Err(CheckoutError::Bag(e)) => {
            warn!(error = %e, "Checkout aborted: invalid bag line");
            flash::push(&session, FlashMessage::error(format!("Please check your bag: {e}")))
                .await?;
            Ok(Redirect::to("/bag").into_response())
        }
        Err(CheckoutError::EmptyBag) => {
            flash::push(&session, FlashMessage::error(EMPTY_BAG_MESSAGE)).await?;
            Ok(Redirect::to("/products").into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Show a completed order, link it to the signed-in user and empty the bag.
#[instrument(skip(state, session, user))]
pub async fn success(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(order_number): Path<String>,
) -> Result<CheckoutSuccessTemplate> {
    let store = state.store();
    let number = OrderNumber::new(order_number);
    let order = store
        .get_by_number(&number)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {number}")))?;

    let save_info = session
        .remove::<bool>(session_keys::SAVE_INFO)
        .await?
        .unwrap_or(false);

    if let Some(user) = &user {
        let profile = store.get_or_create_profile(user).await?;
        match order.user_profile_id {
            Some(existing) if existing != profile.id => {
                warn!(order_number = %number, "Order belongs to another profile");
            }
            _ => {
                store.attach_profile(order.id, profile.id).await?;
                if save_info {
                    store
                        .update_defaults(profile.id, &ProfileDefaults::from(&order.shipping))
                        .await?;
                }
            }
        }
    }

    flash::push(
        &session,
        FlashMessage::success(format!(
            "Order successfully processed! Your order number is {number}. A confirmation \
             email will be sent to {}.",
            order.shipping.email
        )),
    )
    .await?;
    bag::clear(&session).await?;

    let items = store.line_items(order.id).await?;
    let page = PageContext::load(&state, &session, user.as_ref()).await?;
    Ok(CheckoutSuccessTemplate {
        page,
        order: OrderView::new(order, &items, &state),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::FieldError;

    #[test]
    fn test_form_fields_carry_values_and_errors() {
        let form = CheckoutForm {
            full_name: "Ada".to_string(),
            ..CheckoutForm::default()
        };
        let errors = CheckoutFormError {
            fields: vec![FieldError {
                field: "email",
                message: "email cannot be empty".to_string(),
            }],
        };

        let fields = form_fields(&form, Some(&errors));
        assert_eq!(fields.len(), 9);

        let name = fields.iter().find(|f| f.name == "full_name");
        assert!(name.is_some_and(|f| f.value == "Ada" && f.error.is_none()));

        let email = fields.iter().find(|f| f.name == "email");
        assert!(email.is_some_and(|f| f.error.as_deref() == Some("email cannot be empty")));

        let county = fields.iter().find(|f| f.name == "county");
        assert!(county.is_some_and(|f| !f.required));
    }
}
