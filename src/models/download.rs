use serde::{Deserialize, Serialize};

/// Audit/quota record. One row is appended per token mint (not per actual
/// file fetch); counting these rows against the product's download limit is
/// how quota is enforced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Download {
    pub id: String,
    pub user_id: String,
    pub product_id: String,
    pub license_id: String,
    /// The issued token URL.
    pub download_url: String,
    /// Expiry of the issued token.
    pub expires_at: i64,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: i64,
}

#[derive(Debug)]
pub struct NewDownload<'a> {
    pub user_id: &'a str,
    pub product_id: &'a str,
    pub license_id: &'a str,
    pub download_url: &'a str,
    pub expires_at: i64,
    pub ip_address: &'a str,
    pub user_agent: &'a str,
}
