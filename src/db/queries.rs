use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    DOWNLOAD_COLS, LICENSE_COLS, ORDER_COLS, ORDER_ITEM_COLS, PRODUCT_COLS, USER_COLS, query_all,
    query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a fresh license key. UUIDv4 gives 122 bits of randomness, so a
/// collision is a data-corruption event rather than a handled error path; the
/// UNIQUE constraint on licenses.key is the backstop.
pub fn generate_license_key() -> String {
    Uuid::new_v4().to_string()
}

// ============ Users & sessions ============
//
// User accounts and sessions are owned by the external identity layer; these
// writers exist for that layer (and tests) to seed the tables this core reads.

pub fn create_user(conn: &Connection, email: &str, name: Option<&str>) -> Result<User> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO users (id, email, name, role, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'user', 1, ?4, ?4)",
        params![&id, email, name, now],
    )?;
    Ok(User {
        id,
        email: email.to_string(),
        name: name.map(String::from),
        role: "user".to_string(),
        is_active: true,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        [id],
    )
}

pub fn set_user_active(conn: &Connection, id: &str, active: bool) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
        params![active, now(), id],
    )?;
    Ok(updated > 0)
}

pub fn create_session(conn: &Connection, user_id: &str, expires_at: i64) -> Result<String> {
    let token = gen_id();
    conn.execute(
        "INSERT INTO sessions (token, user_id, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![&token, user_id, expires_at, now()],
    )?;
    Ok(token)
}

/// Resolve a session token to its user. Expired sessions resolve to None.
pub fn get_session_user(conn: &Connection, token: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM users u
             JOIN sessions s ON s.user_id = u.id
             WHERE s.token = ?1 AND s.expires_at > ?2",
            USER_COLS
                .split(", ")
                .map(|c| format!("u.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        params![token, now()],
    )
}

// ============ Products ============

pub fn create_product(conn: &Connection, input: &CreateProduct) -> Result<Product> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO products (id, name, description, version, price_cents, file_size,
            download_url, download_limit, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)",
        params![
            &id,
            &input.name,
            &input.description,
            &input.version,
            input.price_cents,
            input.file_size,
            &input.download_url,
            input.download_limit,
            now
        ],
    )?;
    Ok(Product {
        id,
        name: input.name.clone(),
        description: input.description.clone(),
        version: input.version.clone(),
        price_cents: input.price_cents,
        file_size: input.file_size,
        download_url: input.download_url.clone(),
        download_limit: input.download_limit,
        is_active: true,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_product_by_id(conn: &Connection, id: &str) -> Result<Option<Product>> {
    query_one(
        conn,
        &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLS),
        [id],
    )
}

pub fn list_active_products(conn: &Connection) -> Result<Vec<Product>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM products WHERE is_active = 1 ORDER BY name",
            PRODUCT_COLS
        ),
        [],
    )
}

pub fn set_product_active(conn: &Connection, id: &str, active: bool) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE products SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
        params![active, now(), id],
    )?;
    Ok(updated > 0)
}

// ============ Orders ============

/// Create a completed-or-failed purchase record. Enforces the creation-time
/// invariant total == amount + tax.
pub fn create_order(conn: &Connection, input: &NewOrder<'_>) -> Result<Order> {
    if input.total_cents != input.amount_cents + input.tax_cents {
        return Err(AppError::Internal(format!(
            "order totals do not reconcile: {} + {} != {}",
            input.amount_cents, input.tax_cents, input.total_cents
        )));
    }

    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO orders (id, user_id, amount_cents, tax_cents, total_cents, status,
            payment_status, payment_intent_id, billing_email, billing_name, billing_address,
            created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            &id,
            input.user_id,
            input.amount_cents,
            input.tax_cents,
            input.total_cents,
            input.status.to_string(),
            input.payment_status,
            input.payment_intent_id,
            input.billing_email,
            input.billing_name,
            input.billing_address,
            now
        ],
    )?;
    Ok(Order {
        id,
        user_id: input.user_id.to_string(),
        amount_cents: input.amount_cents,
        tax_cents: input.tax_cents,
        total_cents: input.total_cents,
        status: input.status,
        payment_status: input.payment_status.to_string(),
        payment_intent_id: input.payment_intent_id.map(String::from),
        billing_email: input.billing_email.to_string(),
        billing_name: input.billing_name.to_string(),
        billing_address: input.billing_address.to_string(),
        created_at: now,
    })
}

pub fn create_order_item(
    conn: &Connection,
    order_id: &str,
    product_id: &str,
    quantity: i64,
    price_cents: i64,
) -> Result<OrderItem> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO order_items (id, order_id, product_id, quantity, price_cents, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, order_id, product_id, quantity, price_cents, now],
    )?;
    Ok(OrderItem {
        id,
        order_id: order_id.to_string(),
        product_id: product_id.to_string(),
        quantity,
        price_cents,
        created_at: now,
    })
}

pub fn get_order_by_id(conn: &Connection, order_id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        [order_id],
    )
}

/// Fetch an order only if it belongs to the given user. Cross-user lookups
/// are indistinguishable from NotFound.
pub fn find_owned_order(conn: &Connection, user_id: &str, order_id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE id = ?1 AND user_id = ?2",
            ORDER_COLS
        ),
        params![order_id, user_id],
    )
}

pub fn list_orders_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Order>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE user_id = ?1 ORDER BY created_at DESC",
            ORDER_COLS
        ),
        [user_id],
    )
}

pub fn list_order_items_with_products(
    conn: &Connection,
    order_id: &str,
) -> Result<Vec<OrderItemWithProduct>> {
    let cols = ORDER_ITEM_COLS
        .split(", ")
        .map(|c| format!("i.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    query_all(
        conn,
        &format!(
            "SELECT {}, p.name, p.version FROM order_items i
             JOIN products p ON p.id = i.product_id
             WHERE i.order_id = ?1
             ORDER BY i.created_at",
            cols
        ),
        [order_id],
    )
}

pub fn find_order_by_payment_intent(
    conn: &Connection,
    payment_intent_id: &str,
) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE payment_intent_id = ?1",
            ORDER_COLS
        ),
        [payment_intent_id],
    )
}

/// Mark the order for a failed payment. Returns false (a no-op, not an
/// error) when no order was ever created for the transaction reference.
pub fn mark_order_failed_by_intent(conn: &Connection, payment_intent_id: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE orders SET status = ?1, payment_status = 'failed' WHERE payment_intent_id = ?2",
        params![OrderStatus::Failed.to_string(), payment_intent_id],
    )?;
    Ok(updated > 0)
}

// ============ Licenses ============

/// Mint exactly `quantity` independent licenses for one purchased line item.
/// Each gets a fresh key, is_active = true, activated_at = NULL.
pub fn mint_licenses_for_purchase(
    conn: &Connection,
    user_id: &str,
    product_id: &str,
    order_id: Option<&str>,
    quantity: i64,
) -> Result<Vec<License>> {
    let mut minted = Vec::with_capacity(quantity.max(0) as usize);
    for _ in 0..quantity {
        let id = gen_id();
        let key = generate_license_key();
        let now = now();
        conn.execute(
            "INSERT INTO licenses (id, key, user_id, product_id, order_id, is_active,
                activated_at, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, NULL, NULL, ?6)",
            params![&id, &key, user_id, product_id, order_id, now],
        )?;
        minted.push(License {
            id,
            key,
            user_id: user_id.to_string(),
            product_id: product_id.to_string(),
            order_id: order_id.map(String::from),
            is_active: true,
            activated_at: None,
            expires_at: None,
            created_at: now,
        });
    }
    Ok(minted)
}

/// Fetch a license only if it belongs to the given user. Cross-user lookups
/// are indistinguishable from NotFound (no existence leakage).
pub fn find_owned_license(
    conn: &Connection,
    user_id: &str,
    license_id: &str,
) -> Result<Option<License>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM licenses WHERE id = ?1 AND user_id = ?2",
            LICENSE_COLS
        ),
        params![license_id, user_id],
    )
}

/// Redemption lookup: the token's claimed (license, user, product) triple
/// must all match an active license row.
pub fn find_license_for_redemption(
    conn: &Connection,
    license_id: &str,
    user_id: &str,
    product_id: &str,
) -> Result<Option<License>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM licenses
             WHERE id = ?1 AND user_id = ?2 AND product_id = ?3 AND is_active = 1",
            LICENSE_COLS
        ),
        params![license_id, user_id, product_id],
    )
}

/// Public-validator lookup: active licenses only, optionally scoped to a
/// product.
pub fn find_license_by_key(
    conn: &Connection,
    key: &str,
    product_id: Option<&str>,
) -> Result<Option<License>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM licenses
             WHERE key = ?1 AND is_active = 1
               AND (?2 IS NULL OR product_id = ?2)",
            LICENSE_COLS
        ),
        params![key, product_id],
    )
}

/// Owner-gated activate/deactivate. Activation stamps activated_at; expiry is
/// deliberately untouched since it is a one-way terminal condition.
pub fn set_license_active(
    conn: &Connection,
    license_id: &str,
    user_id: &str,
    active: bool,
) -> Result<Option<License>> {
    let updated = if active {
        conn.execute(
            "UPDATE licenses SET is_active = 1, activated_at = ?1
             WHERE id = ?2 AND user_id = ?3",
            params![now(), license_id, user_id],
        )?
    } else {
        conn.execute(
            "UPDATE licenses SET is_active = 0 WHERE id = ?1 AND user_id = ?2",
            params![license_id, user_id],
        )?
    };
    if updated == 0 {
        return Ok(None);
    }
    find_owned_license(conn, user_id, license_id)
}

/// Validator heartbeat: refresh activated_at when it is NULL or older than
/// 24 hours. Affects future activity tracking only, never the current call.
pub fn refresh_activation_heartbeat(conn: &Connection, license_id: &str) -> Result<()> {
    let now = now();
    conn.execute(
        "UPDATE licenses SET activated_at = ?1
         WHERE id = ?2 AND (activated_at IS NULL OR activated_at < ?3)",
        params![now, license_id, now - 24 * 3600],
    )?;
    Ok(())
}

pub fn list_licenses_for_user(conn: &Connection, user_id: &str) -> Result<Vec<LicenseWithProduct>> {
    let cols = license_cols_with_product();
    query_all(
        conn,
        &format!(
            "{} WHERE l.user_id = ?1 ORDER BY l.created_at DESC",
            cols
        ),
        [user_id],
    )
}

pub fn list_licenses_for_order(conn: &Connection, order_id: &str) -> Result<Vec<LicenseWithProduct>> {
    let cols = license_cols_with_product();
    query_all(
        conn,
        &format!("{} WHERE l.order_id = ?1 ORDER BY l.created_at", cols),
        [order_id],
    )
}

fn license_cols_with_product() -> String {
    let cols = LICENSE_COLS
        .split(", ")
        .map(|c| format!("l.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT {}, p.name, p.version FROM licenses l JOIN products p ON p.id = l.product_id",
        cols
    )
}

// ============ Downloads (quota tracking) ============

pub fn count_downloads(
    conn: &Connection,
    user_id: &str,
    product_id: &str,
    license_id: &str,
) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM downloads
         WHERE user_id = ?1 AND product_id = ?2 AND license_id = ?3",
        params![user_id, product_id, license_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaReservation {
    /// A download row was appended; `used` includes it.
    Reserved { used: i64 },
    /// The quota was already spent; nothing was written.
    Exhausted { used: i64 },
}

/// Atomically check the quota and append the download row in one guarded
/// INSERT, so two concurrent requests at `count = limit - 1` cannot both pass.
pub fn reserve_download(
    conn: &Connection,
    download: &NewDownload<'_>,
    limit: i64,
) -> Result<QuotaReservation> {
    let inserted = conn.execute(
        "INSERT INTO downloads (id, user_id, product_id, license_id, download_url,
            expires_at, ip_address, user_agent, created_at)
         SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
         WHERE (SELECT COUNT(*) FROM downloads
                WHERE user_id = ?2 AND product_id = ?3 AND license_id = ?4) < ?10",
        params![
            gen_id(),
            download.user_id,
            download.product_id,
            download.license_id,
            download.download_url,
            download.expires_at,
            download.ip_address,
            download.user_agent,
            now(),
            limit
        ],
    )?;
    let used = count_downloads(conn, download.user_id, download.product_id, download.license_id)?;
    if inserted == 0 {
        Ok(QuotaReservation::Exhausted { used })
    } else {
        Ok(QuotaReservation::Reserved { used })
    }
}

pub fn list_downloads_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Download>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM downloads WHERE user_id = ?1 ORDER BY created_at DESC",
            DOWNLOAD_COLS
        ),
        [user_id],
    )
}
