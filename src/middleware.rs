//! Admin shared-secret middleware
//!
//! The admin surface is protected by a single shared secret configured via
//! the `ADMIN_PASSWORD` environment variable and presented in the
//! `x-admin-password` header. Requests are rejected before any side effect;
//! an unset or empty secret rejects everything.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::env;

pub const ADMIN_HEADER: &str = "x-admin-password";

/// Whether the request carries the configured admin secret.
pub fn is_admin(headers: &HeaderMap) -> bool {
    let Ok(admin_secret) = env::var("ADMIN_PASSWORD") else {
        return false;
    };
    if admin_secret.is_empty() {
        return false;
    }

    headers
        .get(ADMIN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value == admin_secret)
        .unwrap_or(false)
}

/// Middleware guarding the admin route subtree.
pub async fn admin_auth(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if !is_admin(&headers) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "Unauthorized. Admin access required."
            })),
        )
            .into_response());
    }

    Ok(next.run(request).await)
}
