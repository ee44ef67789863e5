pub mod analytics;
pub mod export;
pub mod join;
pub mod network;
pub mod qrcode;
pub mod sessions;
pub mod ws;

use crate::auth::{extract_bearer, verify_presenter_token};
use crate::error::EngineError;
use axum::http::HeaderMap;

/// Pulls the presenter's `sub` claim out of the `Authorization` header,
/// verifying the JWT against the engine's secret key.
pub(crate) fn require_presenter(headers: &HeaderMap, secret: &str) -> Result<String, EngineError> {
    let raw = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer)
        .ok_or_else(|| EngineError::Unauthorized("missing bearer token".to_owned()))?;
    let claims = verify_presenter_token(raw, secret)
        .ok_or_else(|| EngineError::Unauthorized("invalid or expired token".to_owned()))?;
    Ok(claims.sub)
}

pub(crate) fn require_owner(session_owner_id: &str, presenter_id: &str) -> Result<(), EngineError> {
    if session_owner_id != presenter_id {
        return Err(EngineError::Forbidden("not the session owner".to_owned()));
    }
    Ok(())
}
