//! Payment-processor webhook types and signature verification.
//!
//! The processor reports completed and failed transactions via signed webhook
//! events. Signatures are `t=<unix>,v1=<hex hmac-sha256>` over `{t}.{body}`
//! with the shared webhook secret; verification is constant-time and bounds
//! the timestamp to defeat replay.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted webhook timestamp skew.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
pub struct PaymentWebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentEventData,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEventData {
    pub object: serde_json::Value,
}

/// A completed checkout: buyer reference, totals, billing snapshot, and the
/// purchased line items.
#[derive(Debug, Deserialize)]
pub struct CheckoutSessionCompleted {
    pub id: String,
    /// Our user id, set when the checkout session was created.
    pub client_reference_id: Option<String>,
    pub payment_intent: Option<String>,
    pub payment_status: String,
    /// Pre-tax subtotal in cents.
    pub amount_subtotal: i64,
    /// Total charged in cents.
    pub amount_total: i64,
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub line_items: Vec<CheckoutLineItem>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub address: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutLineItem {
    /// Stable internal product id carried through the processor's metadata.
    /// Resolution is by this id, never by display-name matching.
    pub product_id: String,
    pub product_name: Option<String>,
    pub quantity: i64,
    /// Line total in cents (unit price x quantity).
    pub amount_total: i64,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentFailed {
    pub id: String,
}

/// Verify a webhook signature header against the raw body.
///
/// Returns Ok(true)/Ok(false) for well-formed headers and Err for headers
/// missing the timestamp or signature components.
pub fn verify_webhook_signature(secret: &str, payload: &[u8], header: &str) -> Result<bool> {
    let mut timestamp: Option<i64> = None;
    let mut signature: Option<Vec<u8>> = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signature = hex::decode(value).ok(),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| AppError::BadRequest("Missing signature timestamp".into()))?;
    let signature =
        signature.ok_or_else(|| AppError::BadRequest("Missing signature".into()))?;

    if (Utc::now().timestamp() - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Ok(false);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    Ok(expected.ct_eq(signature.as_slice()).into())
}

/// Compute a signature header for a payload. Used by tests and the dev CLI
/// to exercise the webhook endpoint.
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";

    #[test]
    fn test_valid_signature_accepted() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign_payload(SECRET, payload, Utc::now().timestamp());
        assert!(verify_webhook_signature(SECRET, payload, &header).unwrap());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign_payload("wrong_secret", payload, Utc::now().timestamp());
        assert!(!verify_webhook_signature(SECRET, payload, &header).unwrap());
    }

    #[test]
    fn test_modified_payload_rejected() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let tampered = br#"{"type":"checkout.session.completed","hacked":true}"#;
        let header = sign_payload(SECRET, payload, Utc::now().timestamp());
        assert!(!verify_webhook_signature(SECRET, tampered, &header).unwrap());
    }

    #[test]
    fn test_old_timestamp_rejected() {
        let payload = br#"{}"#;
        let stale = Utc::now().timestamp() - SIGNATURE_TOLERANCE_SECS - 10;
        let header = sign_payload(SECRET, payload, stale);
        assert!(!verify_webhook_signature(SECRET, payload, &header).unwrap());
    }

    #[test]
    fn test_missing_timestamp_errors() {
        assert!(verify_webhook_signature(SECRET, b"{}", "v1=deadbeef").is_err());
    }

    #[test]
    fn test_missing_signature_errors() {
        assert!(verify_webhook_signature(SECRET, b"{}", "t=12345").is_err());
    }
}
