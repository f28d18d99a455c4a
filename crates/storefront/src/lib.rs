//! Kestrel Storefront library.
//!
//! The storefront serves the product catalog, keeps the shopping bag in the
//! session, takes payment through Stripe and turns paid bags into orders.
//! Orders can be created by two independent request flows: the customer's
//! checkout form submission and Stripe's `payment_intent.succeeded` webhook.
//! [`services::webhook::WebhookReconciler`] makes sure those flows converge
//! on a single order.
//!
//! The crate is a library so the binary, the CLI and the integration tests
//! share the same repositories and services.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod stripe;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
