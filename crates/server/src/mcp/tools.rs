// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

pub const DEFAULT_DAYS: u32 = 30;
pub const MAX_DAYS: u32 = 365;

#[derive(Debug, Clone, Serialize)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// The requested tool does not exist.
#[derive(Debug)]
pub struct UnknownTool(pub String);

fn days_schema() -> Value {
    json!({
        "type": "integer",
        "description": "Number of days of history to retrieve",
        "default": DEFAULT_DAYS,
        "minimum": 1,
        "maximum": MAX_DAYS,
    })
}

pub fn catalog() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "get_measurements",
            description: "Withings body measurements (weight, body composition, blood pressure, heart rate, SpO2, temperature) as raw measure groups.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "days": days_schema(),
                    "meastypes": {
                        "type": "string",
                        "description": "Comma-separated Withings measure type ids (e.g. \"1,6\"); all types when omitted",
                    },
                },
                "required": [],
            }),
        },
        ToolDef {
            name: "get_activity",
            description: "Daily activity summaries: steps, distance, calories, active minutes, heart rate.",
            input_schema: json!({
                "type": "object",
                "properties": { "days": days_schema() },
                "required": [],
            }),
        },
        ToolDef {
            name: "get_sleep",
            description: "Per-night sleep summaries: sleep score, durations by phase, wake-ups, efficiency.",
            input_schema: json!({
                "type": "object",
                "properties": { "days": days_schema() },
                "required": [],
            }),
        },
        ToolDef {
            name: "get_token_status",
            description: "Status of the Withings OAuth token: validity, expiry, re-authorization flag. Never returns secrets.",
            input_schema: json!({ "type": "object", "properties": {}, "required": [] }),
        },
    ]
}

/// Parse the `days` argument: default when absent, clamped to `1..=MAX_DAYS`.
pub fn days_arg(args: &Value) -> Result<u32, String> {
    match args.get("days") {
        None | Some(Value::Null) => Ok(DEFAULT_DAYS),
        Some(v) => {
            let days = v
                .as_u64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| format!("days must be a positive integer, got {v}"))?;
            Ok(u32::try_from(days).unwrap_or(MAX_DAYS).clamp(1, MAX_DAYS))
        }
    }
}

/// Run a tool. Tool failures are reported inside the result (`isError`), not
/// as JSON-RPC errors; only an unknown tool name is.
pub async fn call(state: &AppState, name: &str, args: &Value) -> Result<Value, UnknownTool> {
    let outcome: anyhow::Result<Value> = match name {
        "get_measurements" => match days_arg(args) {
            Ok(days) => {
                let meastypes = args.get("meastypes").and_then(Value::as_str);
                state.vendor.measures(days, meastypes).await
            }
            Err(e) => Err(anyhow::anyhow!(e)),
        },
        "get_activity" => match days_arg(args) {
            Ok(days) => state.vendor.activity(days).await,
            Err(e) => Err(anyhow::anyhow!(e)),
        },
        "get_sleep" => match days_arg(args) {
            Ok(days) => state.vendor.sleep_summary(days).await,
            Err(e) => Err(anyhow::anyhow!(e)),
        },
        "get_token_status" => {
            let status = state.manager.store().status(Utc::now()).await;
            serde_json::to_value(status).map_err(anyhow::Error::from)
        }
        other => return Err(UnknownTool(other.to_owned())),
    };

    Ok(match outcome {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
            json!({ "content": [{ "type": "text", "text": text }], "isError": false })
        }
        Err(e) => {
            warn!(tool = name, err = %e, "mcp tool failed");
            json!({ "content": [{ "type": "text", "text": format!("{e:#}") }], "isError": true })
        }
    })
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;
