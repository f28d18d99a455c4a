//! Stripe-related errors.

use thiserror::Error;

/// Errors that can occur when interacting with Stripe.
#[derive(Debug, Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("Stripe request failed: {0}")]
    Request(String),

    /// Failed to parse response.
    #[error("Stripe response error: {0}")]
    Response(String),

    /// Stripe API returned an error object.
    #[error("Stripe API error ({kind}): {message}")]
    Api { kind: String, message: String },

    /// The `Stripe-Signature` header could not be parsed.
    #[error("Invalid Stripe signature header: {0}")]
    InvalidSignatureHeader(String),

    /// A webhook payload did not decode.
    #[error("Invalid Stripe payload: {0}")]
    InvalidPayload(String),
}
