//! Stripe API object shapes.
//!
//! Only the fields the storefront reads are declared; serde ignores the rest.

use std::collections::HashMap;

use serde::Deserialize;

use super::StripeError;

/// A webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

/// Payload wrapper of an [`Event`].
#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl Event {
    /// Decode the event's object as a payment intent.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::InvalidPayload` if the object is not a payment intent.
    pub fn payment_intent(&self) -> Result<PaymentIntent, StripeError> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| StripeError::InvalidPayload(format!("payment intent: {e}")))
    }
}

/// A payment intent.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Amount in minor units.
    pub amount: i64,
    pub currency: String,
    /// Present on creation responses; handed to Stripe.js.
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub shipping: Option<Shipping>,
    /// ID of the most recent charge.
    #[serde(default)]
    pub latest_charge: Option<String>,
}

/// Shipping details collected by Stripe.js.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Shipping {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Address,
}

/// A postal address. Stripe sends absent parts as `null` or `""`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    /// County, state or province.
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    /// Two-letter country code.
    #[serde(default)]
    pub country: Option<String>,
}

/// A charge.
#[derive(Debug, Clone, Deserialize)]
pub struct Charge {
    pub id: String,
    /// Amount in minor units.
    pub amount: i64,
    #[serde(default)]
    pub billing_details: BillingDetails,
}

/// Billing contact of a charge.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorBody {
    pub error: ApiError,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_payment_intent_event() {
        let json = r#"{
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {"object": {
                "id": "pi_123",
                "object": "payment_intent",
                "amount": 2200,
                "currency": "usd",
                "latest_charge": "ch_456",
                "metadata": {"bag": "{\"12\":2}", "save_info": "true", "username": "AnonymousUser"},
                "shipping": {
                    "name": "Ada Lovelace",
                    "phone": "0123",
                    "address": {"line1": "1 Main St", "line2": null, "city": "Dublin",
                                "state": "", "postal_code": "D01", "country": "IE"}
                }
            }}
        }"#;

        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");

        let intent = event.payment_intent().unwrap();
        assert_eq!(intent.amount, 2200);
        assert_eq!(intent.latest_charge.as_deref(), Some("ch_456"));
        assert_eq!(intent.metadata.get("bag").map(String::as_str), Some(r#"{"12":2}"#));
        let shipping = intent.shipping.unwrap();
        assert_eq!(shipping.address.state.as_deref(), Some(""));
        assert!(shipping.address.line2.is_none());
    }

    #[test]
    fn test_non_intent_object_is_rejected() {
        let event: Event = serde_json::from_str(
            r#"{"id": "evt_2", "type": "payment_intent.succeeded", "data": {"object": {"id": 5}}}"#,
        )
        .unwrap();
        assert!(matches!(
            event.payment_intent(),
            Err(StripeError::InvalidPayload(_))
        ));
    }
}
