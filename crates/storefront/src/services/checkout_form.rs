//! Checkout form validation.

use serde::Deserialize;
use thiserror::Error;

use kestrel_core::{Email, ShippingDetails, non_empty};

use crate::models::ProfileDefaults;

/// A single rejected form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// The checkout form failed validation.
#[derive(Debug, Clone, Error)]
#[error("checkout form has {} invalid field(s)", .fields.len())]
pub struct CheckoutFormError {
    pub fields: Vec<FieldError>,
}

impl CheckoutFormError {
    /// Message for a field, if it was rejected.
    #[must_use]
    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

/// Posted checkout form.
///
/// Also used to re-render the form after a failed submission, so every field
/// keeps the raw input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CheckoutForm {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub country: String,
    pub postcode: String,
    pub town_or_city: String,
    pub street_address1: String,
    pub street_address2: String,
    pub county: String,
    /// Payment intent client secret echoed back by the payment page.
    pub client_secret: String,
    /// Checkbox; present when ticked.
    pub save_info: Option<String>,
}

impl CheckoutForm {
    /// Prefill from a signed-in customer's saved defaults.
    #[must_use]
    pub fn prefilled(
        full_name: Option<&str>,
        email: Option<&Email>,
        defaults: &ProfileDefaults,
    ) -> Self {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        Self {
            full_name: full_name.unwrap_or_default().to_string(),
            email: email.map(|e| e.as_str().to_string()).unwrap_or_default(),
            phone_number: text(&defaults.phone_number),
            country: text(&defaults.country),
            postcode: text(&defaults.postcode),
            town_or_city: text(&defaults.town_or_city),
            street_address1: text(&defaults.street_address1),
            street_address2: text(&defaults.street_address2),
            county: text(&defaults.county),
            client_secret: String::new(),
            save_info: None,
        }
    }

    /// Whether the "save this information" box was ticked.
    #[must_use]
    pub fn wants_save_info(&self) -> bool {
        self.save_info
            .as_deref()
            .is_some_and(|v| !v.is_empty() && v != "false")
    }

    /// Payment intent ID carried in the client secret
    /// (`pi_..._secret_...`).
    #[must_use]
    pub fn payment_intent_id(&self) -> Option<&str> {
        let secret = self.client_secret.trim();
        let pid = secret.split("_secret").next().unwrap_or_default();
        (!pid.is_empty()).then_some(pid)
    }

    /// Validate the delivery fields.
    ///
    /// # Errors
    ///
    /// Returns every rejected field, not just the first.
    pub fn validate(&self) -> Result<ShippingDetails, CheckoutFormError> {
        let mut errors = Vec::new();

        let full_name = required(&mut errors, "full_name", &self.full_name, 50);
        let phone_number = required(&mut errors, "phone_number", &self.phone_number, 20);
        let country = required(&mut errors, "country", &self.country, 40);
        let town_or_city = required(&mut errors, "town_or_city", &self.town_or_city, 40);
        let street_address1 =
            required(&mut errors, "street_address1", &self.street_address1, 80);
        let postcode = optional(&mut errors, "postcode", &self.postcode, 20);
        let street_address2 =
            optional(&mut errors, "street_address2", &self.street_address2, 80);
        let county = optional(&mut errors, "county", &self.county, 80);

        let email = match Email::parse(&self.email) {
            Ok(email) => Some(email),
            Err(e) => {
                errors.push(FieldError {
                    field: "email",
                    message: e.to_string(),
                });
                None
            }
        };

        match email {
            Some(email) if errors.is_empty() => Ok(ShippingDetails {
                full_name,
                email,
                phone_number,
                country,
                postcode,
                town_or_city,
                street_address1,
                street_address2,
                county,
            }),
            _ => Err(CheckoutFormError { fields: errors }),
        }
    }
}

fn required(errors: &mut Vec<FieldError>, field: &'static str, value: &str, max: usize) -> String {
    let value = value.trim();
    if value.is_empty() {
        errors.push(FieldError {
            field,
            message: "This field is required.".to_string(),
        });
    } else if value.chars().count() > max {
        errors.push(too_long(field, max));
    }
    value.to_string()
}

fn optional(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: &str,
    max: usize,
) -> Option<String> {
    let value = non_empty(Some(value));
    if value.as_ref().is_some_and(|v| v.chars().count() > max) {
        errors.push(too_long(field, max));
    }
    value
}

fn too_long(field: &'static str, max: usize) -> FieldError {
    FieldError {
        field,
        message: format!("Ensure this value has at most {max} characters."),
    }
}
