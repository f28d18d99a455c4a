//! Customer profiles with saved delivery defaults.

use serde::Serialize;

use kestrel_core::{ProfileId, ShippingDetails, UserId};

/// Delivery details remembered for a signed-in customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileDefaults {
    pub phone_number: Option<String>,
    pub country: Option<String>,
    pub postcode: Option<String>,
    pub town_or_city: Option<String>,
    pub street_address1: Option<String>,
    pub street_address2: Option<String>,
    pub county: Option<String>,
}

impl From<&ShippingDetails> for ProfileDefaults {
    fn from(shipping: &ShippingDetails) -> Self {
        Self {
            phone_number: Some(shipping.phone_number.clone()),
            country: Some(shipping.country.clone()),
            postcode: shipping.postcode.clone(),
            town_or_city: Some(shipping.town_or_city.clone()),
            street_address1: Some(shipping.street_address1.clone()),
            street_address2: shipping.street_address2.clone(),
            county: shipping.county.clone(),
        }
    }
}

/// A customer profile, one per user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: ProfileId,
    pub user_id: UserId,
    pub username: String,
    pub defaults: ProfileDefaults,
}
