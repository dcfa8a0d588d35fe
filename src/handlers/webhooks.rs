//! Payment-completion reactor.
//!
//! The sole writer that creates orders, order items, and license records.
//! Fulfillment runs inside one transaction so a partial failure rolls back
//! cleanly; the confirmation email afterwards is best-effort and can never
//! fail the reaction.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use rusqlite::Connection;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::models::{NewOrder, OrderStatus, User};
use crate::payments::{
    CheckoutSessionCompleted, PaymentIntentFailed, PaymentWebhookEvent, verify_webhook_signature,
};

pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(secret) = state.config.payment_webhook_secret.as_deref() else {
        tracing::error!("PAYMENT_WEBHOOK_SECRET is not set");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Webhook secret not configured");
    };

    let signature = match headers.get("payment-signature").and_then(|v| v.to_str().ok()) {
        Some(s) => s,
        None => return (StatusCode::BAD_REQUEST, "Missing payment-signature header"),
    };

    match verify_webhook_signature(secret, &body, signature) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::BAD_REQUEST, "Invalid signature"),
        Err(e) => {
            tracing::warn!(error = %e, "malformed webhook signature header");
            return (StatusCode::BAD_REQUEST, "Invalid signature header");
        }
    }

    let event: PaymentWebhookEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "failed to parse payment webhook");
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    match event.event_type.as_str() {
        "checkout.session.completed" => handle_checkout_completed(state, &event).await,
        "payment_intent.payment_failed" => handle_payment_failed(state, &event).await,
        _ => (StatusCode::OK, "Event ignored"),
    }
}

/// Create Order + OrderItems + one License per purchased unit, atomically.
async fn handle_checkout_completed(
    state: AppState,
    event: &PaymentWebhookEvent,
) -> (StatusCode, &'static str) {
    let session: CheckoutSessionCompleted = match serde_json::from_value(event.data.object.clone())
    {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to parse checkout session");
            return (StatusCode::BAD_REQUEST, "Invalid checkout session");
        }
    };

    let Some(user_id) = session.client_reference_id.as_deref() else {
        tracing::error!(session_id = %session.id, "no buyer reference in checkout session");
        return (StatusCode::OK, "No buyer reference");
    };

    if session.payment_status != "paid" {
        return (StatusCode::OK, "Payment not completed");
    }

    // All database work happens in this scope; the connection must be back
    // in the pool before the email send awaits.
    let (user, order_id) = {
        let mut conn = match state.db.get() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "DB connection error");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
            }
        };

        let user = match queries::get_user_by_id(&conn, user_id) {
            Ok(Some(u)) => u,
            Ok(None) => {
                tracing::error!(user_id, session_id = %session.id, "buyer not found");
                return (StatusCode::OK, "Unknown buyer");
            }
            Err(e) => {
                tracing::error!(error = %e, "DB error");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
            }
        };

        let tx = match conn.transaction() {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(error = %e, "failed to open transaction");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
            }
        };

        let order_id = match fulfill_checkout(&tx, user_id, &session) {
            Ok(id) => id,
            Err(e) => {
                // Dropping the transaction rolls back any partial writes.
                tracing::error!(error = %e, session_id = %session.id, "fulfillment failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Fulfillment failed");
            }
        };

        if let Err(e) = tx.commit() {
            tracing::error!(error = %e, "failed to commit fulfillment");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
        (user, order_id)
    };

    tracing::info!(
        order_id = %order_id,
        user_id,
        session_id = %session.id,
        "order fulfilled with licenses"
    );

    // Best-effort confirmation. Failures are logged and swallowed so they
    // never surface as a failure of the payment reaction.
    if let Err(e) = send_confirmation(&state, &user, &order_id).await {
        tracing::error!(error = %e, order_id = %order_id, "failed to send confirmation email");
    }

    (StatusCode::OK, "OK")
}

/// The transactional core: order row, then per line item an order-item row
/// and one license per unit of quantity. Any error unwinds the whole batch.
fn fulfill_checkout(
    conn: &Connection,
    user_id: &str,
    session: &CheckoutSessionCompleted,
) -> Result<String> {
    let customer = session.customer_details.as_ref();
    let billing_address = customer
        .map(|c| c.address.to_string())
        .unwrap_or_else(|| "{}".to_string());

    let order = queries::create_order(
        conn,
        &NewOrder {
            user_id,
            amount_cents: session.amount_subtotal,
            tax_cents: session.amount_total - session.amount_subtotal,
            total_cents: session.amount_total,
            status: OrderStatus::Completed,
            payment_status: "paid",
            payment_intent_id: session.payment_intent.as_deref(),
            billing_email: customer.and_then(|c| c.email.as_deref()).unwrap_or(""),
            billing_name: customer.and_then(|c| c.name.as_deref()).unwrap_or(""),
            billing_address: &billing_address,
        },
    )?;

    for item in &session.line_items {
        // Line items carry our stable product id in the processor metadata;
        // resolution never falls back to display-name matching.
        let product = queries::get_product_by_id(conn, &item.product_id)?.ok_or_else(|| {
            crate::error::AppError::Internal(format!(
                "checkout references unknown product {}",
                item.product_id
            ))
        })?;

        queries::create_order_item(conn, &order.id, &product.id, item.quantity, item.amount_total)?;
        queries::mint_licenses_for_purchase(
            conn,
            user_id,
            &product.id,
            Some(&order.id),
            item.quantity,
        )?;
    }

    Ok(order.id)
}

async fn send_confirmation(state: &AppState, user: &User, order_id: &str) -> Result<()> {
    // Read everything into owned values and release the connection before
    // the outbound HTTP call.
    let (order, items, licenses) = {
        let conn = state.db.get()?;
        let order = queries::get_order_by_id(&conn, order_id)?
            .ok_or_else(|| crate::error::AppError::Internal("fulfilled order vanished".into()))?;
        let items = queries::list_order_items_with_products(&conn, order_id)?;
        let licenses = queries::list_licenses_for_order(&conn, order_id)?;
        (order, items, licenses)
    };

    state
        .email
        .send_order_confirmation(
            &user.email,
            user.name.as_deref().unwrap_or("Customer"),
            &order,
            &items,
            &licenses,
        )
        .await?;
    Ok(())
}

/// Mark the order for a failed payment, if one exists. A failed payment with
/// no prior order is a no-op, not an error.
async fn handle_payment_failed(
    state: AppState,
    event: &PaymentWebhookEvent,
) -> (StatusCode, &'static str) {
    let intent: PaymentIntentFailed = match serde_json::from_value(event.data.object.clone()) {
        Ok(i) => i,
        Err(e) => {
            tracing::error!(error = %e, "failed to parse payment intent");
            return (StatusCode::BAD_REQUEST, "Invalid payment intent");
        }
    };

    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "DB connection error");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    match queries::mark_order_failed_by_intent(&conn, &intent.id) {
        Ok(true) => tracing::info!(payment_intent = %intent.id, "order marked failed"),
        Ok(false) => {
            tracing::info!(payment_intent = %intent.id, "failed payment with no prior order")
        }
        Err(e) => {
            tracing::error!(error = %e, "DB error");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    }

    (StatusCode::OK, "OK")
}
