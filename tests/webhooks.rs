mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use chrono::Utc;
use common::*;
use keymint::db::queries;
use keymint::models::{NewOrder, OrderStatus};
use keymint::payments::sign_payload;
use serde_json::json;
use tower::ServiceExt;

async fn deliver(app: &Router, secret: &str, event: &serde_json::Value) -> Response<Body> {
    let body = event.to_string();
    let signature = sign_payload(secret, body.as_bytes(), Utc::now().timestamp());
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/payment")
                .header("Content-Type", "application/json")
                .header("payment-signature", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

fn checkout_event(user_id: &str, product_id: &str, quantity: i64) -> serde_json::Value {
    json!({
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_abc123",
                "client_reference_id": user_id,
                "payment_intent": "pi_test_123",
                "payment_status": "paid",
                "amount_subtotal": 9998,
                "amount_total": 10798,
                "customer_details": {
                    "email": "buyer@example.com",
                    "name": "Ada Buyer",
                    "address": { "country": "US", "postal_code": "94110" }
                },
                "line_items": [{
                    "product_id": product_id,
                    "product_name": "SecureVault Pro",
                    "quantity": quantity,
                    "amount_total": 9998
                }]
            }
        }
    })
}

#[tokio::test]
async fn test_checkout_mints_order_items_and_licenses() {
    let state = create_test_state();
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let product = create_test_product(&conn, "SecureVault Pro", None, None);
    let app = test_app(state);

    let response = deliver(&app, TEST_WEBHOOK_SECRET, &checkout_event(&user.id, &product.id, 2)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let orders = queries::list_orders_for_user(&conn, &user.id).unwrap();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.amount_cents, 9998);
    assert_eq!(order.tax_cents, 800);
    assert_eq!(order.total_cents, 10798);
    assert_eq!(order.payment_intent_id.as_deref(), Some("pi_test_123"));
    assert_eq!(order.billing_email, "buyer@example.com");

    let items = queries::list_order_items_with_products(&conn, &order.id).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].item.quantity, 2);
    assert_eq!(items[0].product_name, "SecureVault Pro");

    // Quantity two means two independent licenses with distinct keys.
    let licenses = queries::list_licenses_for_order(&conn, &order.id).unwrap();
    assert_eq!(licenses.len(), 2);
    assert_ne!(licenses[0].license.key, licenses[1].license.key);
    for l in &licenses {
        assert!(l.license.is_active);
        assert!(l.license.activated_at.is_none());
        assert_eq!(l.license.user_id, user.id);
    }
}

#[tokio::test]
async fn test_bad_signature_rejected_without_side_effects() {
    let state = create_test_state();
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let product = create_test_product(&conn, "SecureVault Pro", None, None);
    let app = test_app(state);

    let response = deliver(&app, "whsec_wrong", &checkout_event(&user.id, &product.id, 1)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(queries::list_orders_for_user(&conn, &user.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_signature_header_rejected() {
    let state = create_test_state();
    let app = test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/payment")
                .header("Content-Type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stale_signature_rejected() {
    let state = create_test_state();
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let product = create_test_product(&conn, "SecureVault Pro", None, None);
    let app = test_app(state);

    let event = checkout_event(&user.id, &product.id, 1);
    let body = event.to_string();
    let signature = sign_payload(
        TEST_WEBHOOK_SECRET,
        body.as_bytes(),
        Utc::now().timestamp() - 600,
    );
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/payment")
                .header("Content-Type", "application/json")
                .header("payment-signature", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(queries::list_orders_for_user(&conn, &user.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_product_rolls_back_everything() {
    let state = create_test_state();
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let app = test_app(state);

    let response = deliver(
        &app,
        TEST_WEBHOOK_SECRET,
        &checkout_event(&user.id, "prod_deleted", 1),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The order row written before the bad line item must not survive.
    assert!(queries::list_orders_for_user(&conn, &user.id).unwrap().is_empty());
    assert!(queries::list_licenses_for_user(&conn, &user.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_unpaid_session_is_acknowledged_without_fulfillment() {
    let state = create_test_state();
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let product = create_test_product(&conn, "SecureVault Pro", None, None);
    let app = test_app(state);

    let mut event = checkout_event(&user.id, &product.id, 1);
    event["data"]["object"]["payment_status"] = json!("unpaid");
    let response = deliver(&app, TEST_WEBHOOK_SECRET, &event).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(queries::list_orders_for_user(&conn, &user.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_buyer_reference_is_acknowledged() {
    let state = create_test_state();
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let product = create_test_product(&conn, "SecureVault Pro", None, None);
    let app = test_app(state);

    let mut event = checkout_event(&user.id, &product.id, 1);
    event["data"]["object"]["client_reference_id"] = json!(null);
    let response = deliver(&app, TEST_WEBHOOK_SECRET, &event).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(queries::list_orders_for_user(&conn, &user.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_payment_marks_existing_order() {
    let state = create_test_state();
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let order = queries::create_order(
        &conn,
        &NewOrder {
            user_id: &user.id,
            amount_cents: 4999,
            tax_cents: 0,
            total_cents: 4999,
            status: OrderStatus::Pending,
            payment_status: "processing",
            payment_intent_id: Some("pi_doomed"),
            billing_email: "buyer@example.com",
            billing_name: "Ada Buyer",
            billing_address: "{}",
        },
    )
    .unwrap();
    let app = test_app(state);

    let event = json!({
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": "pi_doomed" } }
    });
    let response = deliver(&app, TEST_WEBHOOK_SECRET, &event).await;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
    assert_eq!(stored.payment_status, "failed");
}

#[tokio::test]
async fn test_failed_payment_with_no_order_is_noop() {
    let state = create_test_state();
    let app = test_app(state);

    let event = json!({
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": "pi_never_seen" } }
    });
    let response = deliver(&app, TEST_WEBHOOK_SECRET, &event).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unhandled_event_type_is_ignored() {
    let state = create_test_state();
    let app = test_app(state);

    let event = json!({
        "type": "customer.subscription.updated",
        "data": { "object": {} }
    });
    let response = deliver(&app, TEST_WEBHOOK_SECRET, &event).await;
    assert_eq!(response.status(), StatusCode::OK);
}
