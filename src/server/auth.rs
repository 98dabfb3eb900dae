// src/server/auth.rs

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use super::SharedState;
use super::error::ApiError;

/// Bearer token check for the API routes. No configured token, no check.
pub async fn require_token(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.auth_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized("Unauthorized"))?;

    if token.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() == 0 {
        tracing::debug!("Rejected request with wrong bearer token");
        return Err(ApiError::Unauthorized("Invalid token"));
    }
    Ok(next.run(request).await)
}
