use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::{AuthUser, Order, OrderItemWithProduct};

#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItemWithProduct>,
}

/// GET /orders: the caller's purchase history, newest first.
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<OrderWithItems>>> {
    let conn = state.db.get()?;
    let orders = queries::list_orders_for_user(&conn, &user.id)?;
    let mut result = Vec::with_capacity(orders.len());
    for order in orders {
        let items = queries::list_order_items_with_products(&conn, &order.id)?;
        result.push(OrderWithItems { order, items });
    }
    Ok(Json(result))
}

/// GET /orders/{order_id}: one of the caller's orders. Cross-user ids are
/// indistinguishable from NotFound.
pub async fn get_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderWithItems>> {
    let conn = state.db.get()?;
    let order = queries::find_owned_order(&conn, &user.id, &order_id)?
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;
    let items = queries::list_order_items_with_products(&conn, &order.id)?;
    Ok(Json(OrderWithItems { order, items }))
}
