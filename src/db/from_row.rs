//! Row-mapping helpers shared by the query layer.
//!
//! Each model gets a column list constant and a `FromRow` impl so SELECTs
//! stay consistent with the struct layout in one place.

use rusqlite::{Connection, Params, Row, types::Type};

use crate::error::Result;
use crate::models::*;

pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

pub const USER_COLS: &str = "id, email, name, role, is_active, created_at, updated_at";

pub const PRODUCT_COLS: &str = "id, name, description, version, price_cents, file_size, \
     download_url, download_limit, is_active, created_at, updated_at";

pub const ORDER_COLS: &str = "id, user_id, amount_cents, tax_cents, total_cents, status, \
     payment_status, payment_intent_id, billing_email, billing_name, billing_address, created_at";

pub const ORDER_ITEM_COLS: &str =
    "id, order_id, product_id, quantity, price_cents, created_at";

pub const LICENSE_COLS: &str =
    "id, key, user_id, product_id, order_id, is_active, activated_at, expires_at, created_at";

pub const DOWNLOAD_COLS: &str = "id, user_id, product_id, license_id, download_url, \
     expires_at, ip_address, user_agent, created_at";

impl FromRow for User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            role: row.get(3)?,
            is_active: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl FromRow for Product {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            version: row.get(3)?,
            price_cents: row.get(4)?,
            file_size: row.get(5)?,
            download_url: row.get(6)?,
            download_limit: row.get(7)?,
            is_active: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl FromRow for Order {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(5)?;
        let status = status
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            amount_cents: row.get(2)?,
            tax_cents: row.get(3)?,
            total_cents: row.get(4)?,
            status,
            payment_status: row.get(6)?,
            payment_intent_id: row.get(7)?,
            billing_email: row.get(8)?,
            billing_name: row.get(9)?,
            billing_address: row.get(10)?,
            created_at: row.get(11)?,
        })
    }
}

impl FromRow for OrderItem {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            order_id: row.get(1)?,
            product_id: row.get(2)?,
            quantity: row.get(3)?,
            price_cents: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for License {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            key: row.get(1)?,
            user_id: row.get(2)?,
            product_id: row.get(3)?,
            order_id: row.get(4)?,
            is_active: row.get(5)?,
            activated_at: row.get(6)?,
            expires_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

impl FromRow for Download {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            product_id: row.get(2)?,
            license_id: row.get(3)?,
            download_url: row.get(4)?,
            expires_at: row.get(5)?,
            ip_address: row.get(6)?,
            user_agent: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

/// License joined with its product's identity (list endpoints, email).
impl FromRow for LicenseWithProduct {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            license: License::from_row(row)?,
            product_name: row.get(9)?,
            product_version: row.get(10)?,
        })
    }
}

impl FromRow for OrderItemWithProduct {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            item: OrderItem::from_row(row)?,
            product_name: row.get(6)?,
            product_version: row.get(7)?,
        })
    }
}

pub fn query_one<T: FromRow, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Option<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query_map(params, |row| T::from_row(row))?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub fn query_all<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| T::from_row(row))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
