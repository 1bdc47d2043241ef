// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use serde_json::json;

use super::{classify, Envelope, Grant, OAuthClient};
use crate::oauth::{should_refresh_now_at, OAuthSettings, RefreshResult};
use crate::test_support::{
    dead_url, oauth_settings, silent_url, token_body, vendor_error, MockServer,
};

fn envelope(value: serde_json::Value) -> anyhow::Result<Envelope> {
    Ok(serde_json::from_value(value)?)
}

#[test]
fn status_zero_is_success_with_computed_expiry() -> anyhow::Result<()> {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().ok_or(anyhow::anyhow!("time"))?;
    let env = envelope(json!({
        "status": 0,
        "body": { "access_token": "a-new", "refresh_token": "r-new", "expires_in": 10800, "userid": 37 }
    }))?;

    let RefreshResult::Success(grant) = classify(env, Grant::Refresh, now) else {
        anyhow::bail!("expected success");
    };
    assert_eq!(grant.access_token, "a-new");
    assert_eq!(grant.refresh_token, "r-new");
    assert_eq!(grant.expires_in, 10800);
    assert_eq!(grant.expires_at, now + TimeDelta::seconds(10800));
    assert_eq!(grant.user_id.as_deref(), Some("37"));

    // A 3h token is already inside a 24h buffer.
    assert!(should_refresh_now_at(now, grant.expires_at, std::time::Duration::from_secs(86_400)));
    Ok(())
}

#[test]
fn missing_expires_in_defaults_to_three_hours() -> anyhow::Result<()> {
    let now = Utc::now();
    let env = envelope(json!({
        "status": 0,
        "body": { "access_token": "a", "refresh_token": "r", "userid": "abc" }
    }))?;
    let grant = classify(env, Grant::Refresh, now).grant().cloned();
    let grant = grant.ok_or(anyhow::anyhow!("expected success"))?;
    assert_eq!(grant.expires_in, 10_800);
    assert_eq!(grant.expires_at, now + TimeDelta::hours(3));
    assert_eq!(grant.user_id.as_deref(), Some("abc"));
    Ok(())
}

#[yare::parameterized(
    refresh_invalid_token = { 26, Grant::Refresh, "invalid_refresh_token" },
    refresh_other_status = { 601, Grant::Refresh, "api_error" },
    refresh_invalid_params = { 503, Grant::Refresh, "api_error" },
    exchange_invalid_code = { 26, Grant::AuthorizationCode, "invalid_grant" },
    exchange_invalid_params = { 503, Grant::AuthorizationCode, "invalid_grant" },
    exchange_other_status = { 100, Grant::AuthorizationCode, "api_error" },
)]
fn vendor_status_classification(status: i64, grant: Grant, expected: &str) -> anyhow::Result<()> {
    let env = envelope(json!({ "status": status, "error": "nope" }))?;
    let result = classify(env, grant, Utc::now());
    assert_eq!(result.kind(), expected);
    Ok(())
}

#[test]
fn invalid_refresh_token_requires_reauthorization() -> anyhow::Result<()> {
    let env = envelope(json!({ "status": 26, "error": "invalid_token" }))?;
    let result = classify(env, Grant::Refresh, Utc::now());
    assert!(result.requires_reauthorization());
    assert!(!result.is_retryable());
    Ok(())
}

#[test]
fn success_without_tokens_is_api_error() -> anyhow::Result<()> {
    let env = envelope(json!({ "status": 0, "body": { "access_token": "only-access" } }))?;
    let result = classify(env, Grant::Refresh, Utc::now());
    assert!(matches!(result, RefreshResult::ApiError { vendor_status: Some(0), .. }));
    Ok(())
}

#[tokio::test]
async fn refresh_posts_form_and_returns_grant() -> anyhow::Result<()> {
    let server = MockServer::start(vec![(200, token_body("access-2", "refresh-2", 10800))]).await?;
    let client = OAuthClient::new(oauth_settings(&server.url("/v2/oauth2")));

    let result = client.refresh(Some("refresh-1")).await;
    let grant = result.grant().ok_or(anyhow::anyhow!("expected success, got {result:?}"))?;
    assert_eq!(grant.refresh_token, "refresh-2");
    assert_eq!(grant.user_id.as_deref(), Some("4242"));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/v2/oauth2");
    let body = &requests[0].body;
    assert!(body.contains("action=requesttoken"), "{body}");
    assert!(body.contains("grant_type=refresh_token"), "{body}");
    assert!(body.contains("client_id=client-id"), "{body}");
    assert!(body.contains("client_secret=client-secret"), "{body}");
    assert!(body.contains("refresh_token=refresh-1"), "{body}");
    Ok(())
}

#[tokio::test]
async fn refresh_keeps_unchanged_refresh_token_from_vendor() -> anyhow::Result<()> {
    let server = MockServer::start(vec![(200, token_body("access-2", "same-refresh", 10800))]).await?;
    let client = OAuthClient::new(oauth_settings(&server.url("/v2/oauth2")));

    let result = client.refresh(Some("same-refresh")).await;
    assert_eq!(result.grant().map(|g| g.refresh_token.as_str()), Some("same-refresh"));
    Ok(())
}

#[tokio::test]
async fn refresh_status_26_is_invalid_refresh_token() -> anyhow::Result<()> {
    let server = MockServer::start(vec![(200, vendor_error(26, "invalid_token"))]).await?;
    let client = OAuthClient::new(oauth_settings(&server.url("/v2/oauth2")));

    let result = client.refresh(Some("revoked")).await;
    assert!(matches!(result, RefreshResult::InvalidRefreshToken { .. }), "{result:?}");
    assert!(result.requires_reauthorization());
    Ok(())
}

#[tokio::test]
async fn refresh_http_error_is_api_error() -> anyhow::Result<()> {
    let server = MockServer::start(vec![(502, "bad gateway".to_owned())]).await?;
    let client = OAuthClient::new(oauth_settings(&server.url("/v2/oauth2")));

    let result = client.refresh(Some("refresh-1")).await;
    assert!(matches!(result, RefreshResult::ApiError { vendor_status: None, .. }), "{result:?}");
    assert!(result.message().contains("502"));
    Ok(())
}

#[tokio::test]
async fn refresh_connection_failure_is_network_error() {
    let client = OAuthClient::new(oauth_settings(&dead_url()));
    let result = client.refresh(Some("refresh-1")).await;
    assert!(matches!(result, RefreshResult::NetworkError { .. }), "{result:?}");
    assert!(result.is_retryable());
}

#[tokio::test]
async fn refresh_timeout_is_network_error() -> anyhow::Result<()> {
    let settings = OAuthSettings {
        timeout: Duration::from_millis(300),
        ..oauth_settings(&silent_url("/v2/oauth2").await?)
    };
    let client = OAuthClient::new(settings);
    let result = client.refresh(Some("refresh-1")).await;
    let RefreshResult::NetworkError { message } = &result else {
        anyhow::bail!("expected network error, got {result:?}");
    };
    assert_eq!(message, "Withings API timeout");
    assert!(result.is_retryable());
    Ok(())
}

#[tokio::test]
async fn refresh_without_credentials_makes_no_request() -> anyhow::Result<()> {
    let server = MockServer::start(vec![(200, token_body("a", "r", 10800))]).await?;
    let settings = OAuthSettings {
        client_id: None,
        client_secret: Some("  ".to_owned()),
        ..oauth_settings(&server.url("/v2/oauth2"))
    };
    let client = OAuthClient::new(settings);

    let result = client.refresh(None).await;
    let RefreshResult::ConfigurationError { missing } = result else {
        anyhow::bail!("expected configuration error");
    };
    assert_eq!(
        missing,
        vec!["WITHINGS_CLIENT_ID", "WITHINGS_CLIENT_SECRET", "WITHINGS_REFRESH_TOKEN"]
    );
    assert_eq!(server.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn exchange_sends_code_and_redirect_uri() -> anyhow::Result<()> {
    let server = MockServer::start(vec![(200, token_body("access-1", "refresh-1", 10800))]).await?;
    let client = OAuthClient::new(oauth_settings(&server.url("/v2/oauth2")));

    let result = client.exchange_code("the-code").await;
    assert!(result.is_success(), "{result:?}");

    let body = &server.requests()[0].body;
    assert!(body.contains("grant_type=authorization_code"), "{body}");
    assert!(body.contains("code=the-code"), "{body}");
    assert!(body.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8000%2Fauth%2Fcallback"), "{body}");
    Ok(())
}

#[tokio::test]
async fn exchange_expired_code_is_invalid_grant() -> anyhow::Result<()> {
    let server = MockServer::start(vec![(200, vendor_error(503, "Invalid Params"))]).await?;
    let client = OAuthClient::new(oauth_settings(&server.url("/v2/oauth2")));

    let result = client.exchange_code("stale").await;
    assert!(matches!(result, RefreshResult::InvalidGrant { .. }), "{result:?}");
    Ok(())
}

#[tokio::test]
async fn exchange_empty_code_is_configuration_error() -> anyhow::Result<()> {
    let server = MockServer::start(vec![(200, token_body("a", "r", 10800))]).await?;
    let client = OAuthClient::new(oauth_settings(&server.url("/v2/oauth2")));

    let result = client.exchange_code("  ").await;
    assert_eq!(result, RefreshResult::ConfigurationError { missing: vec!["code".to_owned()] });
    assert_eq!(server.call_count(), 0);
    Ok(())
}
