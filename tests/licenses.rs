mod common;

use std::collections::HashSet;

use axum::http::StatusCode;
use common::*;
use keymint::db::queries;
use serde_json::json;

#[tokio::test]
async fn test_list_requires_session() {
    let state = create_test_state();
    let app = test_app(state);

    let response = get(&app, "/licenses", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_returns_only_own_licenses() {
    let state = create_test_state();
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let other = create_test_user(&conn, "other@example.com");
    let product = create_test_product(&conn, "SecureVault Pro", None, None);
    create_test_license(&conn, &user.id, &product.id, true, None);
    create_test_license(&conn, &other.id, &product.id, true, None);
    let token = login(&conn, &user);
    drop(conn);
    let app = test_app(state);

    let response = get(&app, "/licenses", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["user_id"], user.id);
    assert_eq!(list[0]["product_name"], "SecureVault Pro");
}

#[tokio::test]
async fn test_deactivate_kills_the_key() {
    let state = create_test_state();
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let product = create_test_product(&conn, "SecureVault Pro", None, None);
    let license = create_test_license(&conn, &user.id, &product.id, true, None);
    let token = login(&conn, &user);
    drop(conn);
    let app = test_app(state);

    let response = post_json(
        &app,
        "/licenses",
        json!({ "license_id": license.id, "action": "deactivate" }),
        Some(&token),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_active"], false);

    // A dead key validates exactly like an unknown one.
    let response = post_json(
        &app,
        "/licenses/validate",
        json!({ "license_key": license.key }),
        None,
    )
    .await;
    let body = body_json(response).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "Invalid license key");
}

#[tokio::test]
async fn test_activate_stamps_activated_at() {
    let state = create_test_state();
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let product = create_test_product(&conn, "SecureVault Pro", None, None);
    let license = create_test_license(&conn, &user.id, &product.id, false, None);
    let token = login(&conn, &user);
    drop(conn);
    let app = test_app(state);

    let response = post_json(
        &app,
        "/licenses",
        json!({ "license_id": license.id, "action": "activate" }),
        Some(&token),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_active"], true);
    assert!(body["activated_at"].is_number());
}

#[tokio::test]
async fn test_cannot_toggle_someone_elses_license() {
    let state = create_test_state();
    let conn = state.db.get().unwrap();
    let owner = create_test_user(&conn, "owner@example.com");
    let intruder = create_test_user(&conn, "intruder@example.com");
    let product = create_test_product(&conn, "SecureVault Pro", None, None);
    let license = create_test_license(&conn, &owner.id, &product.id, true, None);
    let token = login(&conn, &intruder);
    let app = test_app(state);

    let response = post_json(
        &app,
        "/licenses",
        json!({ "license_id": license.id, "action": "deactivate" }),
        Some(&token),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let stored = queries::find_owned_license(&conn, &owner.id, &license.id)
        .unwrap()
        .unwrap();
    assert!(stored.is_active);
}

#[tokio::test]
async fn test_expired_session_rejected() {
    let state = create_test_state();
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let token = queries::create_session(&conn, &user.id, past_timestamp(1)).unwrap();
    drop(conn);
    let app = test_app(state);

    let response = get(&app, "/licenses", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_minted_keys_are_unique() {
    let state = create_test_state();
    let conn = state.db.get().unwrap();
    let user = create_test_user(&conn, "buyer@example.com");
    let product = create_test_product(&conn, "SecureVault Pro", None, None);

    let mut keys = HashSet::new();
    for _ in 0..100 {
        let minted =
            queries::mint_licenses_for_purchase(&conn, &user.id, &product.id, None, 100).unwrap();
        assert_eq!(minted.len(), 100);
        for license in minted {
            assert!(keys.insert(license.key));
        }
    }
    assert_eq!(keys.len(), 10_000);
}
