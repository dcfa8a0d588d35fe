mod downloads;
mod licenses;
mod orders;
mod products;
mod webhooks;

pub use downloads::*;
pub use licenses::*;
pub use orders::*;
pub use products::*;
pub use webhooks::*;

use axum::{
    Json, Router,
    http::HeaderMap,
    middleware,
    routing::{get, post},
};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::middleware::session_auth;
use crate::ratelimit::RateLimitPreset;
use crate::util::client_ip;

/// Gate a request on the caller's per-IP budget for the given preset.
pub(crate) fn enforce_rate_limit(
    state: &AppState,
    preset: &RateLimitPreset,
    headers: &HeaderMap,
) -> Result<()> {
    let decision = state.limiter.check_preset(preset, &client_ip(headers));
    if decision.allowed {
        return Ok(());
    }
    let now_ms = Utc::now().timestamp_millis();
    Err(AppError::RateLimited {
        retry_after: ((decision.reset_at - now_ms) / 1000).max(1),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/licenses", get(list_licenses).post(update_license))
        .route("/orders", get(list_orders))
        .route("/orders/{order_id}", get(get_order))
        .route("/downloads", get(download_history))
        .route("/downloads/{license_id}", get(request_download))
        .layer(middleware::from_fn_with_state(state.clone(), session_auth));

    Router::new()
        .route("/health", get(health))
        .route("/products", get(list_products))
        .route("/products/{product_id}", get(get_product))
        .route("/licenses/validate", post(validate_license))
        .route("/downloads/file/{token}", get(redeem_download))
        .route("/webhooks/payment", post(payment_webhook))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
