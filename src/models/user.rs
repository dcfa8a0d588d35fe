use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    /// Account-active flag. Inactive users fail every entitlement check.
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Caller identity resolved by the session layer and attached to requests.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: String,
}
