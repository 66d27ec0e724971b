//! Service-to-service key extraction for internal endpoints.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::AppState;

/// Proof that the caller presented `Authorization: Bearer <INTERNAL_API_KEY>`.
#[derive(Debug, Clone, Copy)]
pub struct InternalAuth;

impl FromRequestParts<AppState> for InternalAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Without a configured key the internal surface does not exist.
        let expected = state
            .config
            .internal_api_key
            .as_deref()
            .ok_or_else(|| ApiError::not_found("Not found"))?;

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        let key = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"))?;

        if !constant_time_eq(key.as_bytes(), expected.as_bytes()) {
            tracing::warn!("internal request with wrong key");
            return Err(ApiError::unauthorized("Invalid internal API key"));
        }
        Ok(InternalAuth)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
