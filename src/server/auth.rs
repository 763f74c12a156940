//! Access control of members-only endpoints

use super::AppState;
use crate::error::ApiError;
use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};

/// Let a request through only if it carries a known user API key
///
/// Keys are read from a bearer `Authorization` header, or else from the `key`
/// query parameter. If no user key is configured, everyone is let through.
pub async fn require_user(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let known_keys = &state.config.user_keys;
    if known_keys.is_empty() {
        return Ok(next.run(request).await);
    }
    let key = request_key(&request).ok_or(ApiError::Unauthorized)?;
    if !known_keys.iter().any(|known| **known == *key) {
        log::debug!("Rejected request to {} with unknown key", request.uri().path());
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

/// API key that a request was made with, if any
fn request_key(request: &Request<Body>) -> Option<String> {
    let header = (request.headers().get(AUTHORIZATION))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
        .filter(|key| !key.is_empty());
    if let Some(key) = header {
        return Some(key.to_owned());
    }
    let query = request.uri().query()?;
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .ok()?
        .into_iter()
        .find_map(|(name, value)| (name == "key" && !value.is_empty()).then_some(value))
}
