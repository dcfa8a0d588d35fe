//! Download token codec.
//!
//! A token is base64url-encoded JSON carrying the (license, product, user)
//! triple and an expiry. It is a capability reference, not a trust boundary:
//! it is deliberately unsigned, and every redemption re-derives authorization
//! from live license/product state. Any structural or parse failure is a hard
//! rejection.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Default lifetime of a minted token: 1 hour.
pub const DEFAULT_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadToken {
    pub license_id: String,
    pub product_id: String,
    pub user_id: String,
    /// Unix seconds after which the token is dead. The token's own expiry is
    /// the only cancellation mechanism short of deactivating the license.
    pub expires_at: i64,
}

impl DownloadToken {
    pub fn mint(license_id: &str, product_id: &str, user_id: &str, ttl_secs: i64) -> Self {
        Self {
            license_id: license_id.to_string(),
            product_id: product_id.to_string(),
            user_id: user_id.to_string(),
            expires_at: Utc::now().timestamp() + ttl_secs,
        }
    }

    pub fn encode(&self) -> String {
        // Serializing a struct of strings and an i64 cannot fail.
        let json = serde_json::to_vec(self).expect("token payload serializes");
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| AppError::BadRequest("Invalid download token".into()))?;
        serde_json::from_slice(&bytes)
            .map_err(|_| AppError::BadRequest("Invalid download token".into()))
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at < now
    }
}
