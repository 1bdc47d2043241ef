// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport: admin control surface, OAuth callback and MCP.

pub mod auth;
pub mod http;
pub mod http_mcp;
pub mod http_token;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/token/status", get(http_token::token_status))
        .route("/token/refresh", post(http_token::token_refresh))
        .route("/token/exchange", post(http_token::token_exchange))
        .route("/authorization-url", get(http_token::authorization_url))
        .route("/scheduler/status", get(http_token::scheduler_status))
        .route("/scheduler/start", post(http_token::scheduler_start))
        .route("/scheduler/stop", post(http_token::scheduler_stop))
        .route("/config", get(http::config_view))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::admin_layer));

    Router::new()
        // No auth
        .route("/health", get(http::health))
        .route("/", get(http::service_info).post(http_mcp::mcp_post))
        .route("/auth/callback", get(http_token::auth_callback))
        // MCP (optional bearer, checked in the handler)
        .route("/mcp", get(http_mcp::mcp_info).post(http_mcp::mcp_post))
        .nest("/admin", admin)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
