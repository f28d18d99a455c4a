//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Redirect to product listing
//! GET  /health                 - Health check (main.rs)
//! GET  /health/ready           - Readiness check (main.rs)
//!
//! # Products
//! GET  /products               - Product listing (q, category, sort, direction)
//! GET  /products/{id}          - Product detail
//!
//! # Bag
//! GET  /bag                    - Bag page
//! POST /bag/add/{id}           - Add to bag, redirect to redirect_url
//! POST /bag/adjust/{id}        - Set quantity, redirect to /bag
//! POST /bag/remove/{id}        - Remove (200, or 500 with an error message)
//!
//! # Checkout
//! GET  /checkout                              - Checkout page, opens payment intent
//! POST /checkout                              - Submit delivery form, write order
//! POST /checkout/cache_checkout_data          - Copy bag onto payment intent metadata
//! GET  /checkout/checkout_success/{number}    - Order confirmation page
//! POST /checkout/wh                           - Stripe webhook
//! ```

pub mod bag;
pub mod checkout;
pub mod page;
pub mod products;
pub mod webhook;

use axum::{
    Router,
    response::Redirect,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
}

/// Create the bag routes router.
pub fn bag_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(bag::show))
        .route("/add/{id}", post(bag::add))
        .route("/adjust/{id}", post(bag::adjust))
        .route("/remove/{id}", post(bag::remove))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::show).post(checkout::submit))
        .route("/cache_checkout_data", post(checkout::cache_checkout_data))
        .route(
            "/checkout_success/{order_number}",
            get(checkout::success),
        )
        .route("/wh", post(webhook::receive))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { Redirect::to("/products") }))
        .nest("/products", product_routes())
        .nest("/bag", bag_routes())
        .nest("/checkout", checkout_routes())
}
