use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};

use super::enforce_rate_limit;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::Product;
use crate::ratelimit::presets;

/// GET /products: the active catalog.
pub async fn list_products(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Product>>> {
    enforce_rate_limit(&state, &presets::SEARCH, &headers)?;

    let conn = state.db.get()?;
    Ok(Json(queries::list_active_products(&conn)?))
}

/// GET /products/{product_id}: a single catalog entry. Inactive products
/// are indistinguishable from absent ones.
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<Product>> {
    let conn = state.db.get()?;
    let product = queries::get_product_by_id(&conn, &product_id)?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::NotFound("Product not found".into()))?;
    Ok(Json(product))
}
