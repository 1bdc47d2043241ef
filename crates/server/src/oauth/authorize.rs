// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consent URL construction and OAuth `state` generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;

use super::OAuthSettings;

/// Fallback `state` value. Predictable, so it offers no CSRF protection;
/// [`generate_state`] is used whenever the caller does not supply one.
pub const DEFAULT_STATE: &str = "withings_oauth";

/// Random OAuth `state` (32 bytes, 43 URL-safe chars).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the Withings consent URL. Pure: no network, no shared state.
pub fn authorization_url(settings: &OAuthSettings, state: Option<&str>) -> anyhow::Result<String> {
    let client_id = settings.client_id.as_deref().unwrap_or_default();
    let state = state.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_STATE);
    let scope = settings.scopes.join(",");
    let url = url::Url::parse_with_params(
        &settings.authorize_url,
        &[
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", settings.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("state", state),
        ],
    )?;
    Ok(url.into())
}

#[cfg(test)]
#[path = "authorize_tests.rs"]
mod tests;
