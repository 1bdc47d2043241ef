// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw Withings data calls backing the MCP tools.
//!
//! Responses are passed through as JSON; no reshaping.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{TimeDelta, Utc};
use serde_json::Value;
use tracing::debug;

use crate::oauth::STATUS_OK;
use crate::token::TokenStore;

const ACTIVITY_FIELDS: &str =
    "steps,distance,calories,totalcalories,soft,moderate,intense,active,hr_average,hr_min,hr_max";
const SLEEP_FIELDS: &str = "sleep_score,total_sleep_time,total_timeinbed,deepsleepduration,lightsleepduration,remsleepduration,wakeupduration,wakeupcount,wasoduration,efficiency,avg_wakeup_latency";

pub struct WithingsApi {
    http: reqwest::Client,
    base_url: String,
    store: Arc<TokenStore>,
}

impl WithingsApi {
    pub fn new(base_url: &str, timeout: Duration, store: Arc<TokenStore>) -> Self {
        Self {
            http: crate::http_client(timeout),
            base_url: base_url.trim_end_matches('/').to_owned(),
            store,
        }
    }

    /// Measurement groups (`/measure?action=getmeas`) for the last `days` days.
    pub async fn measures(&self, days: u32, meastypes: Option<&str>) -> anyhow::Result<Value> {
        let now = Utc::now();
        let start = now - TimeDelta::days(i64::from(days));
        let mut form = vec![
            ("action", "getmeas".to_owned()),
            ("category", "1".to_owned()),
            ("startdate", start.timestamp().to_string()),
            ("enddate", now.timestamp().to_string()),
        ];
        if let Some(types) = meastypes.filter(|t| !t.is_empty()) {
            form.push(("meastypes", types.to_owned()));
        }
        self.call("/measure", form).await
    }

    /// Daily activity summaries (`/v2/measure?action=getactivity`).
    pub async fn activity(&self, days: u32) -> anyhow::Result<Value> {
        let (start, end) = ymd_range(days);
        let form = vec![
            ("action", "getactivity".to_owned()),
            ("startdateymd", start),
            ("enddateymd", end),
            ("data_fields", ACTIVITY_FIELDS.to_owned()),
        ];
        self.call("/v2/measure", form).await
    }

    /// Per-night sleep summaries (`/v2/sleep?action=getsummary`).
    pub async fn sleep_summary(&self, days: u32) -> anyhow::Result<Value> {
        let (start, end) = ymd_range(days);
        let form = vec![
            ("action", "getsummary".to_owned()),
            ("startdateymd", start),
            ("enddateymd", end),
            ("data_fields", SLEEP_FIELDS.to_owned()),
        ];
        self.call("/v2/sleep", form).await
    }

    async fn call(&self, path: &str, mut form: Vec<(&str, String)>) -> anyhow::Result<Value> {
        let Some(token) = self.store.usable_access_token(Utc::now()).await else {
            anyhow::bail!("no valid Withings access token; refresh or re-authorize first");
        };
        form.push(("access_token", token));

        let resp = self
            .http
            .post(format!("{}{path}", self.base_url))
            .form(&form)
            .send()
            .await
            .with_context(|| format!("Withings request to {path} failed"))?
            .error_for_status()
            .with_context(|| format!("Withings request to {path} failed"))?;
        let mut envelope: Value = resp.json().await.context("unreadable Withings response")?;

        let status = envelope.get("status").and_then(Value::as_i64);
        if status != Some(STATUS_OK) {
            let error = envelope.get("error").and_then(Value::as_str).unwrap_or("unknown error");
            anyhow::bail!("Withings API error {}: {error}", status.unwrap_or(-1));
        }
        debug!(path, "Withings data call succeeded");
        Ok(envelope.get_mut("body").map(Value::take).unwrap_or(Value::Null))
    }
}

fn ymd_range(days: u32) -> (String, String) {
    let today = Utc::now().date_naive();
    let start = today - TimeDelta::days(i64::from(days));
    (start.format("%Y-%m-%d").to_string(), today.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
#[path = "vendor_tests.rs"]
mod tests;
