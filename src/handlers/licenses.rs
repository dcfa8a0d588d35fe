use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::enforce_rate_limit;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::{AuthUser, LicenseAction, LicenseWithProduct, ProductSummary, UpdateLicenseRequest};
use crate::ratelimit::presets;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub license_key: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<ValidatedLicense>,
}

#[derive(Debug, Serialize)]
pub struct ValidatedLicense {
    pub id: String,
    pub key: String,
    pub activated_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub product: ProductSummary,
}

fn invalid(reason: &str) -> (StatusCode, Json<ValidateResponse>) {
    (
        StatusCode::OK,
        Json(ValidateResponse {
            valid: false,
            error: Some(reason.to_string()),
            license: None,
        }),
    )
}

/// POST /licenses/validate: public entitlement check used by installed
/// software. Checks run in a fixed order and terminate at the first failure;
/// every ambiguity resolves to rejection.
pub async fn validate_license(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ValidateRequest>,
) -> Result<(StatusCode, Json<ValidateResponse>)> {
    enforce_rate_limit(&state, &presets::LICENSE_VALIDATION, &headers)?;

    let Some(key) = body.license_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ValidateResponse {
                valid: false,
                error: Some("License key is required".to_string()),
                license: None,
            }),
        ));
    };

    let conn = state.db.get()?;

    // Inactive keys are deliberately indistinguishable from unknown ones.
    let Some(license) = queries::find_license_by_key(&conn, key, body.product_id.as_deref())?
    else {
        return Ok(invalid("Invalid license key"));
    };

    if license.is_expired(Utc::now().timestamp()) {
        return Ok(invalid("License has expired"));
    }

    let product = queries::get_product_by_id(&conn, &license.product_id)?
        .ok_or_else(|| AppError::Internal("Product not found for license".into()))?;
    if !product.is_active {
        return Ok(invalid("Product is no longer available"));
    }

    let user = queries::get_user_by_id(&conn, &license.user_id)?
        .ok_or_else(|| AppError::Internal("User not found for license".into()))?;
    if !user.is_active {
        return Ok(invalid("User account is inactive"));
    }

    // Heartbeat for activity tracking. The response carries the pre-refresh
    // timestamp; the refresh only affects future calls.
    queries::refresh_activation_heartbeat(&conn, &license.id)?;

    Ok((
        StatusCode::OK,
        Json(ValidateResponse {
            valid: true,
            error: None,
            license: Some(ValidatedLicense {
                id: license.id,
                key: license.key,
                activated_at: license.activated_at,
                expires_at: license.expires_at,
                product: ProductSummary::from(&product),
            }),
        }),
    ))
}

/// GET /licenses: the caller's licenses, newest first.
pub async fn list_licenses(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<LicenseWithProduct>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_licenses_for_user(&conn, &user.id)?))
}

/// POST /licenses: owner-only activate/deactivate toggle.
///
/// Expiry is untouched by either action: an expired license stays expired
/// even if reactivated.
pub async fn update_license(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(body): Json<UpdateLicenseRequest>,
) -> Result<Json<LicenseWithProduct>> {
    enforce_rate_limit(&state, &presets::API, &headers)?;

    let conn = state.db.get()?;
    let active = matches!(body.action, LicenseAction::Activate);

    let license = queries::set_license_active(&conn, &body.license_id, &user.id, active)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;

    let product = queries::get_product_by_id(&conn, &license.product_id)?
        .ok_or_else(|| AppError::Internal("Product not found for license".into()))?;

    Ok(Json(LicenseWithProduct {
        license,
        product_name: product.name,
        product_version: product.version,
    }))
}
