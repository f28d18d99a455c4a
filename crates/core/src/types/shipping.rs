//! Delivery contact and address details.

use serde::{Deserialize, Serialize};

use super::Email;

/// Contact and delivery address captured for an order.
///
/// Optional parts are `None` rather than empty strings, so a checkout form
/// and a payment-processor shipping block describing the same address compare
/// equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub full_name: String,
    pub email: Email,
    pub phone_number: String,
    /// Two-letter country code.
    pub country: String,
    pub postcode: Option<String>,
    pub town_or_city: String,
    pub street_address1: String,
    pub street_address2: Option<String>,
    pub county: Option<String>,
}

/// Trim a value and map blank input to `None`.
#[must_use]
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some("")), None);
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(Some(" D02 X285 ")), Some("D02 X285".to_owned()));
    }
}
