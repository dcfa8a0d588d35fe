#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use chrono::Utc;
use rusqlite::{Connection, params};
use tower::ServiceExt;
use uuid::Uuid;

use keymint::config::Config;
use keymint::db::{self, AppState, queries};
use keymint::email::EmailService;
use keymint::handlers;
use keymint::models::{CreateProduct, License, Product, User};
use keymint::ratelimit::RateLimiter;

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test123secret456";
pub const TEST_BASE_URL: &str = "http://localhost:3000";

/// Build a full AppState over a throwaway on-disk SQLite database.
pub fn create_test_state() -> AppState {
    let dir = Box::leak(Box::new(tempfile::tempdir().unwrap()));
    let path = dir.path().join("keymint-test.db");
    let pool = db::open_pool(path.to_str().unwrap()).unwrap();
    {
        let conn = pool.get().unwrap();
        db::init_db(&conn).unwrap();
    }

    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: path.to_string_lossy().into_owned(),
        base_url: TEST_BASE_URL.to_string(),
        payment_webhook_secret: Some(TEST_WEBHOOK_SECRET.to_string()),
        resend_api_key: None,
        email_from: "orders@test.local".to_string(),
        dev_mode: true,
    };

    AppState {
        db: pool,
        limiter: RateLimiter::in_memory(),
        email: EmailService::new(None, "orders@test.local".to_string()),
        config: Arc::new(config),
    }
}

pub fn test_app(state: AppState) -> Router {
    handlers::router(state)
}

pub fn create_test_user(conn: &Connection, email: &str) -> User {
    queries::create_user(conn, email, Some("Test User")).unwrap()
}

/// Issue a session token the way the external identity layer would.
pub fn login(conn: &Connection, user: &User) -> String {
    queries::create_session(conn, &user.id, Utc::now().timestamp() + 3600).unwrap()
}

pub fn create_test_product(
    conn: &Connection,
    name: &str,
    download_url: Option<&str>,
    download_limit: Option<i64>,
) -> Product {
    queries::create_product(
        conn,
        &CreateProduct {
            name: name.to_string(),
            description: Some("Test product".to_string()),
            version: Some("2.1.0".to_string()),
            price_cents: 4999,
            file_size: Some(52_428_800),
            download_url: download_url.map(String::from),
            download_limit,
        },
    )
    .unwrap()
}

/// Insert a license row directly, bypassing the mint path, so tests can
/// control expiry and active state.
pub fn create_test_license(
    conn: &Connection,
    user_id: &str,
    product_id: &str,
    is_active: bool,
    expires_at: Option<i64>,
) -> License {
    let id = Uuid::new_v4().to_string();
    let key = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();
    conn.execute(
        "INSERT INTO licenses (id, key, user_id, product_id, order_id, is_active,
            activated_at, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, NULL, ?5, NULL, ?6, ?7)",
        params![&id, &key, user_id, product_id, is_active, expires_at, now],
    )
    .unwrap();
    License {
        id,
        key,
        user_id: user_id.to_string(),
        product_id: product_id.to_string(),
        order_id: None,
        is_active,
        activated_at: None,
        expires_at,
        created_at: now,
    }
}

pub fn future_timestamp(days: i64) -> i64 {
    Utc::now().timestamp() + days * 86400
}

pub fn past_timestamp(days: i64) -> i64 {
    Utc::now().timestamp() - days * 86400
}

pub async fn get(app: &Router, uri: &str, token: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
    token: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    app.clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
