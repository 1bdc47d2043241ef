// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for token, authorization and scheduler control.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::ApiError;
use crate::manager::{RefreshOutcome, RefreshRequest};
use crate::oauth::RefreshResult;
use crate::state::AppState;
use crate::token::mask_token;

fn default_true() -> bool {
    true
}

/// Request body for `POST /admin/token/refresh`.
#[derive(Debug, Deserialize)]
pub struct RefreshBody {
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_true")]
    pub persist: bool,
    #[serde(default)]
    pub redeploy: bool,
}

impl Default for RefreshBody {
    fn default() -> Self {
        Self { refresh_token: None, persist: true, redeploy: false }
    }
}

/// HTTP status and error code for a failed flow.
pub fn failure_code(result: &RefreshResult) -> ApiError {
    match result {
        RefreshResult::Success(_) => ApiError::Internal,
        RefreshResult::InvalidRefreshToken { .. } => ApiError::ReauthorizationRequired,
        RefreshResult::InvalidGrant { .. } => ApiError::BadRequest,
        RefreshResult::NetworkError { .. } => ApiError::GatewayTimeout,
        RefreshResult::ApiError { .. } => ApiError::Upstream,
        RefreshResult::ConfigurationError { .. } => ApiError::NotConfigured,
    }
}

/// JSON body describing a flow outcome. Tokens appear masked only.
pub fn outcome_body(outcome: &RefreshOutcome) -> Value {
    let persistence = outcome.persistence.as_ref().map(|p| json!(p));
    let redeploy = outcome.redeploy.as_ref().map(|p| json!(p));
    match &outcome.refresh {
        RefreshResult::Success(grant) => json!({
            "success": true,
            "result": outcome.refresh.kind(),
            "access_token": mask_token(&grant.access_token),
            "refresh_token": mask_token(&grant.refresh_token),
            "expires_in": grant.expires_in,
            "expires_at": grant.expires_at,
            "user_id": grant.user_id,
            "scope": grant.scope,
            "persistence": persistence,
            "redeploy": redeploy,
        }),
        other => {
            let code = failure_code(other);
            let mut body = json!({
                "success": false,
                "result": other.kind(),
                "error": code.to_error_body(other.message()),
                "retryable": other.is_retryable(),
                "reauthorization_required": other.requires_reauthorization(),
                "authorization_url": outcome.authorization_url,
            });
            if let RefreshResult::ConfigurationError { missing } = other {
                body["missing"] = json!(missing);
            }
            body
        }
    }
}

fn outcome_response(outcome: &RefreshOutcome) -> Response {
    let status = match &outcome.refresh {
        RefreshResult::Success(_) => StatusCode::OK,
        other => failure_code(other).status_code(),
    };
    (status, Json(outcome_body(outcome))).into_response()
}

/// `GET /admin/token/status`
pub async fn token_status(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(s.manager.store().status(Utc::now()).await)
}

/// `POST /admin/token/refresh`: body optional, defaults `persist=true`.
pub async fn token_refresh(State(s): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        RefreshBody::default()
    } else {
        match serde_json::from_slice::<RefreshBody>(&body) {
            Ok(b) => b,
            Err(e) => {
                return ApiError::BadRequest
                    .to_http_response(format!("invalid request body: {e}"))
                    .into_response()
            }
        }
    };

    let outcome = s
        .manager
        .refresh(RefreshRequest {
            refresh_token: body.refresh_token,
            persist: body.persist,
            redeploy: body.redeploy,
        })
        .await;
    outcome.log("admin");
    outcome_response(&outcome)
}

#[derive(Debug, Deserialize)]
pub struct AuthorizationQuery {
    #[serde(default)]
    pub state: Option<String>,
}

/// `GET /admin/authorization-url`
pub async fn authorization_url(
    State(s): State<Arc<AppState>>,
    Query(q): Query<AuthorizationQuery>,
) -> impl IntoResponse {
    match s.manager.begin_authorization(q.state).await {
        Ok(auth) => Json(json!({
            "authorization_url": auth.url,
            "state": auth.state,
            "redirect_uri": s.manager.oauth().settings().redirect_uri,
        }))
        .into_response(),
        Err(e) => ApiError::Internal.to_http_response(format!("{e:#}")).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ExchangeQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub persist: Option<bool>,
}

/// `POST /admin/token/exchange`
pub async fn token_exchange(
    State(s): State<Arc<AppState>>,
    Query(q): Query<ExchangeQuery>,
) -> impl IntoResponse {
    let Some(code) = q.code.filter(|c| !c.trim().is_empty()) else {
        return ApiError::BadRequest.to_http_response("missing code").into_response();
    };
    let outcome = s.manager.exchange_code(&code, q.persist.unwrap_or(true)).await;
    outcome.log("admin-exchange");
    outcome_response(&outcome)
}

/// `GET /admin/scheduler/status`
pub async fn scheduler_status(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(s.scheduler.status().await)
}

/// `POST /admin/scheduler/start`
pub async fn scheduler_start(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let started = s.scheduler.start().await;
    Json(json!({ "started": started, "status": s.scheduler.status().await }))
}

/// `POST /admin/scheduler/stop`
pub async fn scheduler_stop(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let stopped = s.scheduler.stop().await;
    Json(json!({ "stopped": stopped, "status": s.scheduler.status().await }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn page(status: StatusCode, title: &str, detail: &str) -> Response {
    let html = format!(
        "<!doctype html><html><head><title>{t}</title></head>\
         <body><h1>{t}</h1><p>{d}</p></body></html>",
        t = escape_html(title),
        d = escape_html(detail),
    );
    (status, Html(html)).into_response()
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// `GET /auth/callback`: browser redirect target after consent.
pub async fn auth_callback(
    State(s): State<Arc<AppState>>,
    Query(q): Query<CallbackQuery>,
) -> impl IntoResponse {
    if let Some(error) = q.error {
        warn!(error = %error, "authorization denied at Withings");
        return page(StatusCode::BAD_REQUEST, "Authorization failed", &error);
    }
    let (Some(code), Some(state)) = (q.code, q.state) else {
        return page(StatusCode::BAD_REQUEST, "Authorization failed", "missing code or state");
    };

    let Some(outcome) = s.manager.complete_authorization(&state, &code).await else {
        warn!("callback with unknown, expired or reused state");
        return page(
            StatusCode::BAD_REQUEST,
            "Authorization failed",
            "unknown or expired state; request a new authorization URL",
        );
    };
    outcome.log("callback");

    match &outcome.refresh {
        RefreshResult::Success(grant) => {
            let persisted = match &outcome.persistence {
                Some(p) if p.is_success() => "Tokens were saved to Railway.".to_owned(),
                Some(p) => format!("Tokens were NOT saved to Railway: {}", p.message()),
                None => "Tokens were not persisted.".to_owned(),
            };
            page(
                StatusCode::OK,
                "Authorization complete",
                &format!("Access token valid until {}. {persisted}", grant.expires_at),
            )
        }
        other => page(failure_code(other).status_code(), "Authorization failed", &other.message()),
    }
}

#[cfg(test)]
#[path = "http_token_tests.rs"]
mod tests;
