//! Stripe payment processor client.
//!
//! Talks to the Stripe REST API with form-encoded requests and verifies
//! webhook signatures. Only the calls the storefront needs are modelled:
//! creating a payment intent, tagging it with checkout metadata, fetching the
//! charge behind it, and decoding webhook events.

mod client;
mod error;
pub mod types;

pub use client::{SIGNATURE_TOLERANCE_SECS, StripeClient, verify_signature};
pub use error::StripeError;
pub use types::{Address, BillingDetails, Charge, Event, PaymentIntent, Shipping};
