use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use serde::Serialize;

use super::enforce_rate_limit;
use crate::db::{AppState, queries};
use crate::db::queries::QuotaReservation;
use crate::error::{AppError, Result};
use crate::models::{AuthUser, Download, NewDownload};
use crate::ratelimit::presets;
use crate::token::{DEFAULT_TTL_SECS, DownloadToken};
use crate::util::extract_request_info;

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub download_url: String,
    pub expires_at: i64,
    pub product: DownloadProductInfo,
    pub download_info: DownloadQuotaInfo,
}

#[derive(Debug, Serialize)]
pub struct DownloadProductInfo {
    pub name: String,
    pub version: Option<String>,
    pub file_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DownloadQuotaInfo {
    pub remaining_downloads: i64,
    pub total_limit: i64,
}

/// GET /downloads/{license_id}: mint a time-bounded download token.
///
/// Gate order: rate limit, ownership (cross-user indistinguishable from
/// NotFound), license expiry, product download target, then the atomic quota
/// reservation that also appends the audit row.
pub async fn request_download(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(license_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DownloadResponse>> {
    enforce_rate_limit(&state, &presets::DOWNLOADS, &headers)?;

    let conn = state.db.get()?;

    let license = queries::find_owned_license(&conn, &user.id, &license_id)?
        .filter(|l| l.is_active)
        .ok_or_else(|| AppError::NotFound("License not found or inactive".into()))?;

    if license.is_expired(Utc::now().timestamp()) {
        return Err(AppError::Expired("License has expired".into()));
    }

    let product = queries::get_product_by_id(&conn, &license.product_id)?
        .ok_or_else(|| AppError::Internal("Product not found for license".into()))?;
    if product.download_url.is_none() {
        return Err(AppError::NotFound(
            "Download not available for this product".into(),
        ));
    }

    let token = DownloadToken::mint(&license.id, &product.id, &user.id, DEFAULT_TTL_SECS);
    let download_url = format!("{}/downloads/file/{}", state.config.base_url, token.encode());

    let limit = product.effective_download_limit();
    let (ip, user_agent) = extract_request_info(&headers);
    let reservation = queries::reserve_download(
        &conn,
        &NewDownload {
            user_id: &user.id,
            product_id: &product.id,
            license_id: &license.id,
            download_url: &download_url,
            expires_at: token.expires_at,
            ip_address: &ip,
            user_agent: &user_agent,
        },
        limit,
    )?;

    let used = match reservation {
        QuotaReservation::Reserved { used } => used,
        QuotaReservation::Exhausted { used } => {
            return Err(AppError::QuotaExceeded { used, limit });
        }
    };

    tracing::info!(
        license_id = %license.id,
        product_id = %product.id,
        used,
        limit,
        "download token minted"
    );

    Ok(Json(DownloadResponse {
        download_url,
        expires_at: token.expires_at,
        product: DownloadProductInfo {
            name: product.name,
            version: product.version,
            file_size: product.file_size,
        },
        download_info: DownloadQuotaInfo {
            remaining_downloads: limit - used,
            total_limit: limit,
        },
    }))
}

/// GET /downloads/file/{token}: redeem a minted token for a file redirect.
///
/// The token is only a hint: every check is re-derived from live state, in
/// order, with no step skipped. Errors here are terse status-level responses
/// since the caller is typically a browser following a redirect.
pub async fn redeem_download(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response> {
    let token = DownloadToken::decode(&token)?;

    if token.is_expired(Utc::now().timestamp()) {
        return Err(AppError::Expired("Download link has expired".into()));
    }

    let conn = state.db.get()?;

    let license = queries::find_license_for_redemption(
        &conn,
        &token.license_id,
        &token.user_id,
        &token.product_id,
    )?
    .ok_or_else(|| AppError::Forbidden("Invalid license or download not authorized".into()))?;

    if license.is_expired(Utc::now().timestamp()) {
        return Err(AppError::Expired("License has expired".into()));
    }

    let product = queries::get_product_by_id(&conn, &license.product_id)?
        .ok_or_else(|| AppError::Internal("Product not found for license".into()))?;
    let Some(file_url) = product.download_url else {
        return Err(AppError::NotFound("Download URL not available".into()));
    };

    let response = Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, file_url)
        .body(axum::body::Body::empty())
        .map_err(|e| AppError::Internal(format!("Failed to build redirect: {}", e)))?;
    Ok(response)
}

/// GET /downloads: the caller's token-mint history, newest first.
pub async fn download_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Download>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_downloads_for_user(&conn, &user.id)?))
}
