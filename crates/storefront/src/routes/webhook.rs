//! Stripe webhook endpoint.
//!
//! Stripe redelivers an event until it gets a 2xx answer, so only events
//! that should be retried get a server error. Unhandled event types are
//! acknowledged and ignored.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{error, info, instrument, warn};

use crate::services::{PaymentNotification, ReconcileError, ReconcileOutcome, WebhookReconciler};
use crate::state::AppState;
use crate::stripe::{Event, StripeError};

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Receive a Stripe event.
#[instrument(skip_all)]
pub async fn receive(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
    else {
        warn!("Webhook without signature header");
        return (StatusCode::BAD_REQUEST, "Missing Stripe-Signature header").into_response();
    };

    match state.stripe().verify_webhook_signature(&body, signature) {
        Ok(true) => {}
        Ok(false) => {
            warn!("Webhook signature mismatch");
            return (StatusCode::BAD_REQUEST, "Invalid signature").into_response();
        }
        Err(e) => {
            warn!(error = %e, "Malformed webhook signature header");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    }

    let event: Event = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Undecodable webhook payload");
            return (StatusCode::BAD_REQUEST, "Invalid payload").into_response();
        }
    };

    info!(event_id = %event.id, event_type = %event.event_type, "Webhook received");
    handle_event(&state, &event).await.into_response()
}

async fn handle_event(state: &AppState, event: &Event) -> (StatusCode, String) {
    let kind = &event.event_type;
    match kind.as_str() {
        "payment_intent.succeeded" => match payment_succeeded(state, event).await {
            Ok(outcome) => (StatusCode::OK, success_message(kind, &outcome)),
            Err(e) => {
                error!(error = %e, event_id = %event.id, "Webhook reconciliation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Webhook received: {kind} | ERROR: {e}"),
                )
            }
        },
        "payment_intent.payment_failed" => (StatusCode::OK, format!("Webhook received: {kind}")),
        _ => (StatusCode::OK, format!("Unhandled webhook received: {kind}")),
    }
}

/// Failures before the reconciler runs.
#[derive(Debug, thiserror::Error)]
enum SucceededError {
    #[error(transparent)]
    Stripe(#[from] StripeError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

async fn payment_succeeded(
    state: &AppState,
    event: &Event,
) -> Result<ReconcileOutcome, SucceededError> {
    let intent = event.payment_intent()?;
    let charge_id = intent.latest_charge.as_deref().ok_or_else(|| {
        StripeError::InvalidPayload(format!("payment intent {} has no charge", intent.id))
    })?;
    let charge = state.stripe().retrieve_charge(charge_id).await?;
    let payment = PaymentNotification::from_stripe(&intent, &charge)?;

    let outcome =
        WebhookReconciler::new(state.store(), state.notifier(), state.config().webhook)
            .reconcile(&payment)
            .await?;
    Ok(outcome)
}

/// An order stored under the same payment intent that did not match the
/// notification counts as written by this webhook.
fn success_message(kind: &str, outcome: &ReconcileOutcome) -> String {
    match outcome {
        ReconcileOutcome::Matched { .. } => {
            format!("Webhook received: {kind} | SUCCESS: Verified order already in database")
        }
        ReconcileOutcome::Created { .. } | ReconcileOutcome::AlreadyRecorded { .. } => {
            format!("Webhook received: {kind} | SUCCESS: Created order in webhook")
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::Request,
        routing::post,
    };
    use chrono::Utc;
    use hmac::{Hmac, Mac};
    use kestrel_core::{Email, OrderId, OrderNumber, OrderOrigin, ShippingDetails};
    use rust_decimal::Decimal;
    use sha2::Sha256;
    use tower::ServiceExt;

    use crate::models::Order;

    use super::*;
    use crate::testing::{TEST_WEBHOOK_SECRET, lazy_state};

    fn app() -> Router {
        Router::new()
            .route("/checkout/wh", post(receive))
            .with_state(lazy_state())
    }

    fn signed(payload: &str, secret: &str) -> String {
        let t = chrono::Utc::now().timestamp();
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{t}.{payload}").as_bytes());
        format!("t={t},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    async fn post_event(payload: &str, signature: Option<String>) -> (StatusCode, String) {
        let mut request = Request::builder().method("POST").uri("/checkout/wh");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        let response = app()
            .oneshot(request.body(Body::from(payload.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_missing_signature_is_rejected() {
        let (status, _) = post_event("{}", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let payload = r#"{"id":"evt_1","type":"charge.refunded","data":{"object":{}}}"#;
        let (status, body) = post_event(payload, Some(signed(payload, "whsec_wrong"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid signature");
    }

    #[tokio::test]
    async fn test_unhandled_event_is_acknowledged() {
        let payload = r#"{"id":"evt_1","type":"charge.refunded","data":{"object":{}}}"#;
        let (status, body) = post_event(payload, Some(signed(payload, TEST_WEBHOOK_SECRET))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Unhandled webhook received: charge.refunded");
    }

    #[tokio::test]
    async fn test_payment_failed_is_acknowledged() {
        let payload =
            r#"{"id":"evt_2","type":"payment_intent.payment_failed","data":{"object":{}}}"#;
        let (status, body) = post_event(payload, Some(signed(payload, TEST_WEBHOOK_SECRET))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Webhook received: payment_intent.payment_failed");
    }

    #[tokio::test]
    async fn test_undecodable_intent_is_a_server_error() {
        let payload = r#"{"id":"evt_3","type":"payment_intent.succeeded","data":{"object":{"id":7}}}"#;
        let (status, body) = post_event(payload, Some(signed(payload, TEST_WEBHOOK_SECRET))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.starts_with("Webhook received: payment_intent.succeeded | ERROR:"));
    }

    fn stored_order() -> Order {
        Order {
            id: OrderId::new(7),
            order_number: OrderNumber::new("7F3A0C5E9B1D42E8A6C4F2B0D9E7A5C3"),
            user_profile_id: None,
            shipping: ShippingDetails {
                full_name: "Ada Lovelace".into(),
                email: Email::parse("ada@example.com").unwrap(),
                phone_number: "0123456789".into(),
                country: "IE".into(),
                postcode: None,
                town_or_city: "Dublin".into(),
                street_address1: "1 Main Street".into(),
                street_address2: None,
                county: None,
            },
            date: Utc::now(),
            delivery_cost: Decimal::new(200, 2),
            order_total: Decimal::new(2000, 2),
            grand_total: Decimal::new(2200, 2),
            original_bag: r#"{"1":2}"#.into(),
            stripe_pid: "pi_123".into(),
            origin: OrderOrigin::Checkout,
        }
    }

    #[test]
    fn test_success_messages() {
        let kind = "payment_intent.succeeded";
        let matched = ReconcileOutcome::Matched {
            order: stored_order(),
            attempts: 2,
        };
        assert_eq!(
            success_message(kind, &matched),
            "Webhook received: payment_intent.succeeded | SUCCESS: Verified order already in database"
        );

        let created = ReconcileOutcome::Created {
            order: stored_order(),
        };
        assert_eq!(
            success_message(kind, &created),
            "Webhook received: payment_intent.succeeded | SUCCESS: Created order in webhook"
        );
    }

    #[test]
    fn test_differing_stored_order_reports_created() {
        let outcome = ReconcileOutcome::AlreadyRecorded {
            order: stored_order(),
        };
        assert_eq!(
            success_message("payment_intent.succeeded", &outcome),
            "Webhook received: payment_intent.succeeded | SUCCESS: Created order in webhook"
        );
    }
}
