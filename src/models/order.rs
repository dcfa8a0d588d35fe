use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    /// Pre-tax subtotal in cents.
    pub amount_cents: i64,
    pub tax_cents: i64,
    /// Always amount_cents + tax_cents at creation; never recomputed.
    pub total_cents: i64,
    pub status: OrderStatus,
    pub payment_status: String,
    /// External payment-processor transaction reference.
    pub payment_intent_id: Option<String>,
    pub billing_email: String,
    pub billing_name: String,
    /// JSON snapshot of the billing address at purchase time.
    pub billing_address: String,
    pub created_at: i64,
}

#[derive(Debug)]
pub struct NewOrder<'a> {
    pub user_id: &'a str,
    pub amount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub payment_status: &'a str,
    pub payment_intent_id: Option<&'a str>,
    pub billing_email: &'a str,
    pub billing_name: &'a str,
    pub billing_address: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity: i64,
    /// Price captured at purchase time; does not follow catalog changes.
    pub price_cents: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItemWithProduct {
    #[serde(flatten)]
    pub item: OrderItem,
    pub product_name: String,
    pub product_version: Option<String>,
}
