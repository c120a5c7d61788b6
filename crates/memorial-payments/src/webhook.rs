//! Stripe Webhook Handling
//!
//! Verifies the `Stripe-Signature` header and reacts to completed checkouts
//! by issuing the edit code ahead of the visitor's redirect.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{PaymentError, Result};
use crate::verifier::PaymentVerifier;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age (and clock skew) of a signed webhook, in seconds
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Checkout completed; `paid` is false for delayed payment methods
    CheckoutCompleted { session_id: String, paid: bool },

    /// Unhandled event type
    Other { event_type: String },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: RawCheckoutSession,
}

#[derive(Deserialize)]
struct RawCheckoutSession {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
}

/// Check a `t=<unix>,v1=<hex>` signature header against the raw payload.
///
/// The signed message is `"<t>.<payload>"`, HMAC-SHA256 keyed with the
/// endpoint secret. Any matching `v1` entry is accepted.
pub fn verify_signature(payload: &str, header: &str, secret: &str, now: i64) -> Result<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| PaymentError::WebhookSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(PaymentError::WebhookSignature("missing v1 signature".into()));
    }
    // `t` is unauthenticated until the HMAC check; never overflow on it
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(PaymentError::WebhookSignature(
            "timestamp outside tolerance".into(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Config(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());

    let matched = signatures.iter().any(|sig| {
        hex::decode(sig).is_ok_and(|expected| mac.clone().verify_slice(&expected).is_ok())
    });

    if matched {
        Ok(())
    } else {
        Err(PaymentError::WebhookSignature("no matching signature".into()))
    }
}

/// Parse the event body into our event type
pub fn parse_event(payload: &str) -> Result<WebhookEvent> {
    let raw: RawEvent =
        serde_json::from_str(payload).map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

    if raw.event_type != "checkout.session.completed" {
        return Ok(WebhookEvent::Other {
            event_type: raw.event_type,
        });
    }

    let session_id = raw
        .data
        .object
        .id
        .ok_or_else(|| PaymentError::WebhookParse("Invalid checkout session data".into()))?;

    Ok(WebhookEvent::CheckoutCompleted {
        session_id,
        paid: raw.data.object.payment_status.as_deref() == Some("paid"),
    })
}

/// Webhook handler
pub struct WebhookHandler {
    verifier: Arc<PaymentVerifier>,
    secret: String,
}

impl WebhookHandler {
    pub fn new(verifier: Arc<PaymentVerifier>, secret: impl Into<String>) -> Self {
        Self {
            verifier,
            secret: secret.into(),
        }
    }

    /// Verify webhook signature and parse event
    pub fn construct_event(&self, payload: &str, signature: &str) -> Result<WebhookEvent> {
        verify_signature(payload, signature, &self.secret, chrono::Utc::now().timestamp())?;
        parse_event(payload)
    }

    /// Process a webhook event
    pub async fn handle(&self, event: WebhookEvent) -> Result<WebhookEvent> {
        match &event {
            WebhookEvent::CheckoutCompleted {
                session_id,
                paid: true,
            } => {
                let code = self.verifier.register_paid(session_id).await?;
                tracing::info!(session_id = %session_id, code = %code, "Checkout completed");
            }

            WebhookEvent::CheckoutCompleted {
                session_id,
                paid: false,
            } => {
                tracing::info!(session_id = %session_id, "Checkout completed, payment pending");
            }

            WebhookEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
            }
        }

        Ok(event)
    }
}
