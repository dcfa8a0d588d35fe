//! Order-confirmation email delivery via the Resend API.
//!
//! Delivery is best-effort by contract: the payment reactor logs and swallows
//! any failure here, so a mail outage can never fail or roll back a
//! fulfilled order.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{LicenseWithProduct, Order, OrderItemWithProduct};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Format a Unix timestamp as a human-readable date (e.g., "Jan 15, 2024")
fn format_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "Unknown date".to_string())
}

fn format_cents(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, (cents % 100).abs())
}

/// Result of attempting to send an order confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    Sent,
    /// No API key configured; delivery disabled, log only.
    Disabled,
}

#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

#[derive(Clone)]
pub struct EmailService {
    api_key: Option<String>,
    from_email: String,
    http_client: Client,
}

impl EmailService {
    pub fn new(api_key: Option<String>, from_email: String) -> Self {
        Self {
            api_key,
            from_email,
            http_client: Client::new(),
        }
    }

    /// Send the order summary plus every minted license key to the buyer.
    pub async fn send_order_confirmation(
        &self,
        to_email: &str,
        customer_name: &str,
        order: &Order,
        items: &[OrderItemWithProduct],
        licenses: &[LicenseWithProduct],
    ) -> Result<EmailSendResult> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::debug!(order_id = %order.id, "no email API key configured, skipping confirmation");
            return Ok(EmailSendResult::Disabled);
        };

        let subject = format!("Your order confirmation ({})", format_date(order.created_at));

        let mut text = format!(
            "Hi {},\n\nThanks for your purchase! Here is your order summary:\n\n",
            customer_name
        );
        for item in items {
            text.push_str(&format!(
                "  {} x{} — {}\n",
                item.product_name,
                item.item.quantity,
                format_cents(item.item.price_cents)
            ));
        }
        text.push_str(&format!(
            "\nSubtotal: {}\nTax: {}\nTotal: {}\n\nYour license keys:\n\n",
            format_cents(order.amount_cents),
            format_cents(order.tax_cents),
            format_cents(order.total_cents)
        ));
        for license in licenses {
            text.push_str(&format!(
                "  {}: {}\n",
                license.product_name, license.license.key
            ));
        }
        text.push_str(
            "\nYou can download your software and manage your licenses from your account page.\n",
        );

        let request = ResendEmailRequest {
            from: &self.from_email,
            to: vec![to_email],
            subject,
            text,
        };

        let response = self
            .http_client
            .post(RESEND_API_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to reach Resend API");
                AppError::Internal(format!("Email service error: {}", e))
            })?;

        if response.status().is_success() {
            let _result: ResendEmailResponse = response.json().await.map_err(|e| {
                tracing::error!(error = %e, "failed to parse Resend API response");
                AppError::Internal("Email service response error".into())
            })?;
            tracing::info!(to = %to_email, order_id = %order.id, "order confirmation sent");
            Ok(EmailSendResult::Sent)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Resend API returned error");
            Err(AppError::Internal(format!(
                "Email service error: {} - {}",
                status, body
            )))
        }
    }
}
