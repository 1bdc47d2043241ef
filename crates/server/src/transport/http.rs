// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unauthenticated service endpoints and the admin config view.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::mcp::{PROTOCOL_VERSION, SERVER_NAME};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub token_valid: bool,
    pub reauthorization_required: bool,
    pub scheduler_running: bool,
}

/// `GET /health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let store = s.manager.store();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        token_valid: !store.is_expired(Utc::now()).await,
        reauthorization_required: store.reauthorization_required().await.is_some(),
        scheduler_running: s.scheduler.is_running().await,
    })
}

/// `GET /`
pub async fn service_info() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "mcp": { "endpoint": "/mcp", "protocolVersion": PROTOCOL_VERSION },
        "endpoints": {
            "health": "/health",
            "mcp": "/mcp",
            "oauth_callback": "/auth/callback",
            "admin": "/admin",
        },
    }))
}

#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub admin_policy: String,
    pub mcp_auth_enabled: bool,
    pub withings: WithingsView,
    pub railway: RailwayView,
    pub scheduler: SchedulerView,
}

#[derive(Debug, Serialize)]
pub struct WithingsView {
    pub client_id_set: bool,
    pub client_secret_set: bool,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub initial_token_set: bool,
}

#[derive(Debug, Serialize)]
pub struct RailwayView {
    pub configured: bool,
    pub missing: Vec<String>,
    pub persist_on_refresh: bool,
    pub redeploy_on_refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct SchedulerView {
    pub auto_refresh: bool,
    pub interval_seconds: u64,
    pub buffer_seconds: u64,
    pub startup_delay_seconds: u64,
    pub error_backoff_seconds: u64,
}

/// `GET /admin/config`: which settings are present. Never returns values of
/// secrets.
pub async fn config_view(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let c = &s.config;
    let oauth = c.oauth_settings();
    let publisher = c.publisher_settings();
    Json(ConfigView {
        admin_policy: c.admin_policy().to_string(),
        mcp_auth_enabled: c.mcp_auth_token.as_deref().is_some_and(|t| !t.is_empty()),
        withings: WithingsView {
            client_id_set: oauth.client_id.is_some(),
            client_secret_set: oauth.client_secret.is_some(),
            redirect_uri: oauth.redirect_uri,
            scopes: oauth.scopes,
            initial_token_set: c.access_token.is_some() && c.refresh_token.is_some(),
        },
        railway: RailwayView {
            configured: publisher.is_configured(),
            missing: publisher.missing(),
            persist_on_refresh: c.persist_on_refresh,
            redeploy_on_refresh: c.redeploy_on_refresh,
        },
        scheduler: SchedulerView {
            auto_refresh: c.auto_refresh,
            interval_seconds: c.refresh_interval_secs,
            buffer_seconds: c.refresh_buffer_secs,
            startup_delay_seconds: c.startup_delay_secs,
            error_backoff_seconds: c.error_backoff_secs,
        },
    })
}
