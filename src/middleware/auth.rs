//! Session authentication for the user-facing endpoints.
//!
//! Sessions are issued by the external identity layer; this middleware only
//! resolves the bearer token against the sessions table and attaches the
//! caller as an [`AuthUser`] extension. Inactive accounts are rejected here
//! so downstream handlers never see them.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::error::AppError;
use crate::models::AuthUser;
use crate::util::extract_bearer_token;

pub async fn session_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;

    let conn = state.db.get()?;
    let user = queries::get_session_user(&conn, token)?.ok_or(AppError::Unauthorized)?;

    if !user.is_active {
        return Err(AppError::Forbidden("User account is inactive".into()));
    }

    request.extensions_mut().insert(AuthUser {
        id: user.id,
        email: user.email,
        role: user.role,
    });

    Ok(next.run(request).await)
}
