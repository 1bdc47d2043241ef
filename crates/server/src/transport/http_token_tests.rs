// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{TimeDelta, Utc};
use serde_json::json;

use super::{escape_html, failure_code, outcome_body};
use crate::error::ApiError;
use crate::manager::RefreshOutcome;
use crate::oauth::{RefreshResult, TokenGrant};

fn outcome(refresh: RefreshResult) -> RefreshOutcome {
    RefreshOutcome { refresh, token: None, persistence: None, redeploy: None, authorization_url: None }
}

#[yare::parameterized(
    revoked = { RefreshResult::InvalidRefreshToken { message: "x".into() }, ApiError::ReauthorizationRequired },
    bad_code = { RefreshResult::InvalidGrant { message: "x".into() }, ApiError::BadRequest },
    network = { RefreshResult::NetworkError { message: "x".into() }, ApiError::GatewayTimeout },
    vendor = { RefreshResult::ApiError { vendor_status: Some(601), message: "x".into() }, ApiError::Upstream },
    config = { RefreshResult::ConfigurationError { missing: vec!["WITHINGS_CLIENT_ID".into()] }, ApiError::NotConfigured },
)]
fn failures_map_to_codes(result: RefreshResult, expected: ApiError) {
    assert_eq!(failure_code(&result), expected);
}

#[test]
fn success_body_masks_tokens() {
    let grant = TokenGrant {
        access_token: "access-token-abcdef".to_owned(),
        refresh_token: "refresh-token-123456".to_owned(),
        expires_in: 10_800,
        expires_at: Utc::now() + TimeDelta::hours(3),
        user_id: Some("4242".to_owned()),
        scope: None,
    };
    let body = outcome_body(&outcome(RefreshResult::Success(grant)));
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["access_token"], json!("*****def"));
    assert_eq!(body["refresh_token"], json!("*****456"));
    assert!(!body.to_string().contains("access-token-abcdef"));
}

#[test]
fn retryable_and_reauth_are_distinct() {
    let network = outcome_body(&outcome(RefreshResult::NetworkError { message: "timeout".into() }));
    assert_eq!(network["retryable"], json!(true));
    assert_eq!(network["reauthorization_required"], json!(false));

    let mut revoked = outcome(RefreshResult::InvalidRefreshToken { message: "invalid".into() });
    revoked.authorization_url = Some("https://example.test/authorize".to_owned());
    let body = outcome_body(&revoked);
    assert_eq!(body["retryable"], json!(false));
    assert_eq!(body["reauthorization_required"], json!(true));
    assert_eq!(body["authorization_url"], json!("https://example.test/authorize"));
    assert_eq!(body["error"]["code"], json!("REAUTHORIZATION_REQUIRED"));
}

#[test]
fn configuration_error_lists_missing() {
    let body = outcome_body(&outcome(RefreshResult::ConfigurationError {
        missing: vec!["WITHINGS_CLIENT_SECRET".into()],
    }));
    assert_eq!(body["missing"], json!(["WITHINGS_CLIENT_SECRET"]));
}

#[test]
fn html_is_escaped() {
    assert_eq!(escape_html("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;");
}
