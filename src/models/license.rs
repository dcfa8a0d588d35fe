use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    /// Opaque, globally unique key. Generated fresh at mint, never reused.
    pub key: String,
    pub user_id: String,
    pub product_id: String,
    pub order_id: Option<String>,
    pub is_active: bool,
    /// Set on owner activation and refreshed as a validator heartbeat.
    pub activated_at: Option<i64>,
    /// None = never expires. Expiry is one-way and authoritative: every read
    /// path rejects an expired license regardless of is_active.
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl License {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|t| t < now)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LicenseWithProduct {
    #[serde(flatten)]
    pub license: License,
    pub product_name: String,
    pub product_version: Option<String>,
}

/// Owner-requested state toggle for a license.
#[derive(Debug, Deserialize)]
pub struct UpdateLicenseRequest {
    pub license_id: String,
    pub action: LicenseAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseAction {
    Activate,
    Deactivate,
}
