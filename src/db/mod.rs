pub mod from_row;
pub mod queries;

use std::sync::Arc;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::config::Config;
use crate::email::EmailService;
use crate::error::Result;
use crate::ratelimit::RateLimiter;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub limiter: RateLimiter,
    pub email: EmailService,
    pub config: Arc<Config>,
}

pub fn open_pool(path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path);
    let pool = r2d2::Pool::builder()
        .build(manager)
        .map_err(crate::error::AppError::Pool)?;
    Ok(pool)
}

/// Create all tables and indexes. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            name        TEXT,
            role        TEXT NOT NULL DEFAULT 'user',
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        -- Written by the external identity layer; this core only reads them.
        CREATE TABLE IF NOT EXISTS sessions (
            token       TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            expires_at  INTEGER NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS products (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL UNIQUE,
            description     TEXT,
            version         TEXT,
            price_cents     INTEGER NOT NULL DEFAULT 0,
            file_size       INTEGER,
            download_url    TEXT,
            download_limit  INTEGER,
            is_active       INTEGER NOT NULL DEFAULT 1,
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS orders (
            id                 TEXT PRIMARY KEY,
            user_id            TEXT NOT NULL REFERENCES users(id),
            amount_cents       INTEGER NOT NULL,
            tax_cents          INTEGER NOT NULL,
            total_cents        INTEGER NOT NULL,
            status             TEXT NOT NULL,
            payment_status     TEXT NOT NULL,
            payment_intent_id  TEXT,
            billing_email      TEXT NOT NULL DEFAULT '',
            billing_name       TEXT NOT NULL DEFAULT '',
            billing_address    TEXT NOT NULL DEFAULT '{}',
            created_at         INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id);
        CREATE INDEX IF NOT EXISTS idx_orders_intent ON orders(payment_intent_id);

        CREATE TABLE IF NOT EXISTS order_items (
            id           TEXT PRIMARY KEY,
            order_id     TEXT NOT NULL REFERENCES orders(id),
            product_id   TEXT NOT NULL REFERENCES products(id),
            quantity     INTEGER NOT NULL,
            price_cents  INTEGER NOT NULL,
            created_at   INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);

        CREATE TABLE IF NOT EXISTS licenses (
            id            TEXT PRIMARY KEY,
            key           TEXT NOT NULL UNIQUE,
            user_id       TEXT NOT NULL REFERENCES users(id),
            product_id    TEXT NOT NULL REFERENCES products(id),
            order_id      TEXT REFERENCES orders(id),
            is_active     INTEGER NOT NULL DEFAULT 1,
            activated_at  INTEGER,
            expires_at    INTEGER,
            created_at    INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_licenses_user ON licenses(user_id);
        CREATE INDEX IF NOT EXISTS idx_licenses_order ON licenses(order_id);

        CREATE TABLE IF NOT EXISTS downloads (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL REFERENCES users(id),
            product_id    TEXT NOT NULL REFERENCES products(id),
            license_id    TEXT NOT NULL REFERENCES licenses(id),
            download_url  TEXT NOT NULL,
            expires_at    INTEGER NOT NULL,
            ip_address    TEXT NOT NULL,
            user_agent    TEXT NOT NULL,
            created_at    INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_downloads_quota
            ON downloads(user_id, product_id, license_id);
        ",
    )?;
    Ok(())
}
