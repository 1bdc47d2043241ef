// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-RPC over HTTP for MCP clients.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use tracing::debug;

use crate::mcp::{self, JsonRpcRequest, JsonRpcResponse, INVALID_REQUEST, PARSE_ERROR};
use crate::state::AppState;
use crate::transport::auth::validate_bearer;

/// `POST /mcp` and `POST /`
pub async fn mcp_post(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(code) = validate_bearer(&headers, s.config.mcp_auth_token.as_deref()) {
        return code.to_http_response("unauthorized").into_response();
    }

    let value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            debug!(err = %e, "unparseable mcp request");
            return Json(JsonRpcResponse::error(None, PARSE_ERROR, format!("parse error: {e}")))
                .into_response();
        }
    };
    let id = value.get("id").cloned();
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            return Json(JsonRpcResponse::error(id, INVALID_REQUEST, format!("invalid request: {e}")))
                .into_response();
        }
    };

    match mcp::handle(&s, request).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// `GET /mcp`
pub async fn mcp_info() -> impl IntoResponse {
    Json(mcp::info_document())
}
