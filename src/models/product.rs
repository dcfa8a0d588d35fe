use serde::{Deserialize, Serialize};

/// Effective download limit when a product does not set one.
pub const DEFAULT_DOWNLOAD_LIMIT: i64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
    pub price_cents: i64,
    pub file_size: Option<i64>,
    /// Where the deliverable lives. None = nothing to download for this product.
    pub download_url: Option<String>,
    /// Per-license token-mint quota. None = system default.
    pub download_limit: Option<i64>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Product {
    pub fn effective_download_limit(&self) -> i64 {
        self.download_limit.unwrap_or(DEFAULT_DOWNLOAD_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub download_limit: Option<i64>,
}

/// Minimal product identity returned by the public validator.
#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub id: String,
    pub name: String,
    pub version: Option<String>,
}

impl From<&Product> for ProductSummary {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            version: p.version.clone(),
        }
    }
}
