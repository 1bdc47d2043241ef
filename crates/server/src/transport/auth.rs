// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::config::AdminPolicy;
use crate::error::ApiError;
use crate::state::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Check the `X-Admin-Token` header against the admin policy.
pub fn validate_admin(headers: &HeaderMap, policy: &AdminPolicy) -> Result<(), ApiError> {
    let expected = match policy {
        AdminPolicy::Open => return Ok(()),
        AdminPolicy::Closed => return Err(ApiError::NotConfigured),
        AdminPolicy::Token(tok) => tok,
    };

    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if constant_time_eq(presented, expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Validate a Bearer token from HTTP headers. `None` disables the check.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let expected = match expected.filter(|t| !t.is_empty()) {
        Some(tok) => tok,
        None => return Ok(()),
    };

    let header =
        headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(ApiError::Unauthorized)?;

    let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Axum middleware guarding the `/admin` routes.
pub async fn admin_layer(
    state: State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if let Err(code) = validate_admin(req.headers(), &state.config.admin_policy()) {
        let message = match code {
            ApiError::NotConfigured => "admin API not configured",
            _ => "unauthorized",
        };
        warn!(path = %req.uri().path(), code = %code, "admin request rejected");
        return code.to_http_response(message).into_response();
    }
    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
