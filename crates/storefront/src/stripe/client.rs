//! Stripe REST client and webhook signature verification.

use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::{debug, error, instrument};

use kestrel_core::CurrencyCode;

use super::error::StripeError;
use super::types::{ApiErrorBody, Charge, PaymentIntent};
use crate::config::StripeConfig;

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: SecretString,
    webhook_secret: SecretString,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Create a new Stripe client.
    #[must_use]
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    /// Open a payment intent for `amount` minor units.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it.
    #[instrument(skip(self))]
    pub async fn create_payment_intent(
        &self,
        amount: i64,
        currency: CurrencyCode,
    ) -> Result<PaymentIntent, StripeError> {
        let amount = amount.to_string();
        let params = [("amount", amount.as_str()), ("currency", currency.code())];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&params)
            .send()
            .await
            .map_err(|e| StripeError::Request(e.to_string()))?;

        let intent: PaymentIntent = decode(response).await?;
        debug!(payment_intent = %intent.id, "Payment intent created");
        Ok(intent)
    }

    /// Replace metadata keys on a payment intent.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it.
    #[instrument(skip(self, metadata), fields(payment_intent = %id))]
    pub async fn update_payment_intent_metadata(
        &self,
        id: &str,
        metadata: &[(&str, &str)],
    ) -> Result<PaymentIntent, StripeError> {
        let params: Vec<(String, &str)> = metadata
            .iter()
            .map(|(key, value)| (format!("metadata[{key}]"), *value))
            .collect();

        let response = self
            .client
            .post(format!("{}/v1/payment_intents/{id}", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&params)
            .send()
            .await
            .map_err(|e| StripeError::Request(e.to_string()))?;

        decode(response).await
    }

    /// Fetch a charge by ID.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Stripe rejects it.
    #[instrument(skip(self))]
    pub async fn retrieve_charge(&self, id: &str) -> Result<Charge, StripeError> {
        let response = self
            .client
            .get(format!("{}/v1/charges/{id}", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| StripeError::Request(e.to_string()))?;

        decode(response).await
    }

    /// Verify a `Stripe-Signature` header against the raw request body.
    ///
    /// Returns `Ok(false)` for a well-formed header whose signature does not
    /// match or whose timestamp is outside the tolerance window.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::InvalidSignatureHeader` if the header is malformed.
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        header: &str,
    ) -> Result<bool, StripeError> {
        verify_signature(
            self.webhook_secret.expose_secret(),
            payload,
            header,
            chrono::Utc::now().timestamp(),
        )
    }
}

/// Decode a successful response body, or turn a Stripe error body into
/// `StripeError::Api`.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StripeError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| StripeError::Response(e.to_string()))?;

    if !status.is_success() {
        let (kind, message) = serde_json::from_str::<ApiErrorBody>(&body).map_or_else(
            |_| ("unknown".to_string(), format!("HTTP {status}")),
            |b| {
                (
                    b.error.kind.unwrap_or_else(|| "unknown".to_string()),
                    b.error.message.unwrap_or_else(|| format!("HTTP {status}")),
                )
            },
        );
        error!(status = %status, kind = %kind, "Stripe API error");
        return Err(StripeError::Api { kind, message });
    }

    serde_json::from_str(&body).map_err(|e| StripeError::Response(e.to_string()))
}

/// Verify a Stripe webhook signature.
///
/// The header has the form `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`. The
/// signed payload is `"{t}.{body}"`, HMAC-SHA256 keyed with the endpoint
/// secret. Any `v1` entry may match, which lets Stripe roll secrets.
///
/// # Errors
///
/// Returns `StripeError::InvalidSignatureHeader` if the header has no
/// timestamp or no `v1` signature.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
) -> Result<bool, StripeError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    StripeError::InvalidSignatureHeader("timestamp is not a number".to_string())
                })?);
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| StripeError::InvalidSignatureHeader("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(StripeError::InvalidSignatureHeader(
            "missing v1 signature".to_string(),
        ));
    }

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Ok(false);
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| StripeError::InvalidSignatureHeader(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    Ok(signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate)))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_k3str3l_t3st";
    const NOW: i64 = 1_700_000_000;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let header = format!("t={NOW},v1={}", sign(payload, SECRET, NOW));
        assert!(verify_signature(SECRET, payload, &header, NOW).unwrap());
    }

    #[test]
    fn test_any_v1_entry_may_match() {
        let payload = b"{}";
        let header = format!(
            "t={NOW},v1={},v0=legacy,v1={}",
            sign(payload, "whsec_old", NOW),
            sign(payload, SECRET, NOW)
        );
        assert!(verify_signature(SECRET, payload, &header, NOW).unwrap());
    }

    #[test]
    fn test_wrong_secret_or_modified_payload() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let header = format!("t={NOW},v1={}", sign(payload, "whsec_other", NOW));
        assert!(!verify_signature(SECRET, payload, &header, NOW).unwrap());

        let header = format!("t={NOW},v1={}", sign(payload, SECRET, NOW));
        assert!(!verify_signature(SECRET, b"{\"tampered\":1}", &header, NOW).unwrap());
    }

    #[test]
    fn test_timestamp_outside_tolerance() {
        let payload = b"{}";
        let old = NOW - SIGNATURE_TOLERANCE_SECS - 1;
        let header = format!("t={old},v1={}", sign(payload, SECRET, old));
        assert!(!verify_signature(SECRET, payload, &header, NOW).unwrap());
    }

    #[test]
    fn test_malformed_headers() {
        assert!(verify_signature(SECRET, b"{}", "garbage", NOW).is_err());
        assert!(verify_signature(SECRET, b"{}", "v1=abc", NOW).is_err());
        assert!(verify_signature(SECRET, b"{}", "t=1700000000", NOW).is_err());
        assert!(verify_signature(SECRET, b"{}", "t=soon,v1=abc", NOW).is_err());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "ab"));
    }
}
