//! Integration tests for Kestrel.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p kestrel-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `bag_flow` - Bag mutations, pricing and snapshots as the storefront uses them
//! - `checkout_reconciliation` - Checkout and webhook converging on one order
//!
//! The tests run against the storefront's in-memory store and recording
//! notifier, so no database or network is needed.

use kestrel_core::{Email, ShippingDetails};

/// Delivery details used across the scenarios.
///
/// # Panics
///
/// Panics if the fixed email address stops parsing.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn shipping() -> ShippingDetails {
    ShippingDetails {
        full_name: "Ada Lovelace".to_string(),
        email: Email::parse("ada@example.com").unwrap(),
        phone_number: "0123456789".to_string(),
        country: "IE".to_string(),
        postcode: Some("D01 F5P2".to_string()),
        town_or_city: "Dublin".to_string(),
        street_address1: "1 Main Street".to_string(),
        street_address2: None,
        county: Some("Dublin".to_string()),
    }
}
