// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Withings token endpoint client.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    OAuthSettings, RefreshResult, TokenGrant, DEFAULT_EXPIRES_IN_SECS, ENV_CLIENT_ID,
    ENV_CLIENT_SECRET, ENV_REFRESH_TOKEN, STATUS_INVALID_PARAMS, STATUS_INVALID_TOKEN, STATUS_OK,
};

/// Withings wraps every response in `{status, body, error}`; HTTP is 200 even
/// for most failures.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub status: i64,
    #[serde(default)]
    pub body: Option<TokenBody>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenBody {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Number in some responses, string in others.
    #[serde(default)]
    pub userid: Option<Value>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Grant {
    Refresh,
    AuthorizationCode,
}

/// Stateless client for the vendor's OAuth endpoints.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    settings: OAuthSettings,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(settings: OAuthSettings) -> Self {
        let http = crate::http_client(settings.timeout);
        Self { settings, http }
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Exchange a refresh token for a new token set.
    ///
    /// Never mutates shared state; the caller applies the result.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> RefreshResult {
        let refresh_token = refresh_token.map(str::trim).filter(|t| !t.is_empty());
        let mut missing = self.missing_credentials();
        if refresh_token.is_none() {
            missing.push(ENV_REFRESH_TOKEN.to_owned());
        }
        let (Some(client_id), Some(client_secret), Some(refresh_token)) =
            (self.client_id(), self.client_secret(), refresh_token)
        else {
            warn!(missing = ?missing, "token refresh skipped, configuration incomplete");
            return RefreshResult::ConfigurationError { missing };
        };

        let form = [
            ("action", "requesttoken"),
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
        ];
        self.request_token(&form, Grant::Refresh).await
    }

    /// Exchange a one-time authorization code for an initial token set.
    pub async fn exchange_code(&self, code: &str) -> RefreshResult {
        let code = code.trim();
        let mut missing = self.missing_credentials();
        if code.is_empty() {
            missing.push("code".to_owned());
        }
        let (Some(client_id), Some(client_secret), false) =
            (self.client_id(), self.client_secret(), code.is_empty())
        else {
            return RefreshResult::ConfigurationError { missing };
        };

        let form = [
            ("action", "requesttoken"),
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
        ];
        self.request_token(&form, Grant::AuthorizationCode).await
    }

    /// Consent URL for this client. See [`super::authorization_url`].
    pub fn authorization_url(&self, state: Option<&str>) -> anyhow::Result<String> {
        super::authorization_url(&self.settings, state)
    }

    fn client_id(&self) -> Option<&str> {
        self.settings.client_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn client_secret(&self) -> Option<&str> {
        self.settings.client_secret.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn missing_credentials(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.client_id().is_none() {
            missing.push(ENV_CLIENT_ID.to_owned());
        }
        if self.client_secret().is_none() {
            missing.push(ENV_CLIENT_SECRET.to_owned());
        }
        missing
    }

    async fn request_token(&self, form: &[(&str, &str)], grant: Grant) -> RefreshResult {
        let resp = match self.http.post(&self.settings.token_url).form(form).send().await {
            Ok(resp) => resp,
            Err(e) => return network_error(&e),
        };

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return RefreshResult::ApiError {
                vendor_status: None,
                message: format!("token endpoint returned HTTP {status}: {}", truncate(&text)),
            };
        }

        let envelope: Envelope = match resp.json().await {
            Ok(envelope) => envelope,
            Err(e) if e.is_timeout() => return network_error(&e),
            Err(e) => {
                return RefreshResult::ApiError {
                    vendor_status: None,
                    message: format!("unreadable token response: {e}"),
                }
            }
        };
        debug!(vendor_status = envelope.status, ?grant, "token endpoint responded");
        classify(envelope, grant, Utc::now())
    }
}

fn network_error(e: &reqwest::Error) -> RefreshResult {
    let message = if e.is_timeout() {
        "Withings API timeout".to_owned()
    } else {
        format!("request error: {e}")
    };
    RefreshResult::NetworkError { message }
}

fn truncate(text: &str) -> String {
    text.chars().take(200).collect()
}

/// Map a decoded vendor envelope to a [`RefreshResult`].
pub(crate) fn classify(envelope: Envelope, grant: Grant, now: DateTime<Utc>) -> RefreshResult {
    let error = envelope.error.unwrap_or_else(|| "unknown error".to_owned());
    match envelope.status {
        STATUS_OK => {}
        STATUS_INVALID_TOKEN if grant == Grant::Refresh => {
            return RefreshResult::InvalidRefreshToken {
                message: format!("refresh token rejected: {error}"),
            };
        }
        STATUS_INVALID_TOKEN | STATUS_INVALID_PARAMS if grant == Grant::AuthorizationCode => {
            return RefreshResult::InvalidGrant {
                message: format!("authorization code rejected: {error}"),
            };
        }
        other => {
            return RefreshResult::ApiError {
                vendor_status: Some(other),
                message: format!("Withings API error: {error}"),
            };
        }
    }

    let body = envelope.body.unwrap_or_default();
    let (Some(access_token), Some(refresh_token)) = (
        body.access_token.filter(|t| !t.is_empty()),
        body.refresh_token.filter(|t| !t.is_empty()),
    ) else {
        return RefreshResult::ApiError {
            vendor_status: Some(STATUS_OK),
            message: "token response is missing access_token or refresh_token".to_owned(),
        };
    };

    let expires_in = body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    let expires_at = i64::try_from(expires_in)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    RefreshResult::Success(TokenGrant {
        access_token,
        refresh_token,
        expires_in,
        expires_at,
        user_id: body.userid.as_ref().and_then(user_id_string),
        scope: body.scope,
    })
}

fn user_id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
