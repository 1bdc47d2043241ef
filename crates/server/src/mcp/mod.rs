// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MCP over JSON-RPC 2.0: `initialize`, `tools/list`, `tools/call`, `ping`.

pub mod tools;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::state::AppState;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "withings-mcp";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_owned(), result: Some(result), error: None, id }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            result: None,
            error: Some(JsonRpcError { code, message: message.into() }),
            id,
        }
    }
}

/// Dispatch one request. Returns `None` for notifications, which get no body.
pub async fn handle(state: &AppState, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    debug!(method = %request.method, notification = request.is_notification(), "mcp request");
    if request.is_notification() {
        return None;
    }

    let id = request.id;
    let response = match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(id, initialize_result()),
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => JsonRpcResponse::success(id, json!({ "tools": tools::catalog() })),
        "tools/call" => {
            let params = request.params.unwrap_or(Value::Null);
            let Some(name) = params.get("name").and_then(Value::as_str) else {
                return Some(JsonRpcResponse::error(id, INVALID_PARAMS, "missing tool name"));
            };
            let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            match tools::call(state, name, &args).await {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(tools::UnknownTool(name)) => {
                    JsonRpcResponse::error(id, INVALID_PARAMS, format!("unknown tool: {name}"))
                }
            }
        }
        other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("method not found: {other}")),
    };
    Some(response)
}

pub fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

/// Document served on `GET /mcp`.
pub fn info_document() -> Value {
    json!({
        "service": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "MCP JSON-RPC",
        "protocolVersion": PROTOCOL_VERSION,
        "available_methods": ["initialize", "tools/list", "tools/call", "ping"],
        "available_tools": tools::catalog().iter().map(|t| t.name).collect::<Vec<_>>(),
    })
}
