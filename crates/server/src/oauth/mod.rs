// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Withings OAuth: token refresh, code exchange, consent URL, staleness.
//!
//! Everything here is a function of its inputs plus the network. Applying a
//! [`RefreshResult`] to live state is the caller's job (see
//! [`crate::manager`]).

pub mod authorize;
pub mod client;
pub mod staleness;

use std::time::Duration;

use chrono::{DateTime, Utc};

pub use authorize::{authorization_url, generate_state, DEFAULT_STATE};
pub use client::OAuthClient;
pub use staleness::{next_refresh_time, should_refresh_now, should_refresh_now_at};

/// Scopes requested when none are configured.
pub const DEFAULT_SCOPES: &str = "user.metrics,user.activity,user.sleepevents";

/// Lifetime assumed when the vendor omits `expires_in` (3 hours).
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 10_800;

/// Withings `status` for a successful call.
pub const STATUS_OK: i64 = 0;

/// Withings `status` for an invalid or revoked refresh token (and, during
/// exchange, an unusable authorization code).
pub const STATUS_INVALID_TOKEN: i64 = 26;

/// Withings `status` for invalid parameters, returned for expired or reused
/// authorization codes.
pub const STATUS_INVALID_PARAMS: i64 = 503;

pub const ENV_CLIENT_ID: &str = "WITHINGS_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "WITHINGS_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "WITHINGS_REFRESH_TOKEN";

/// Settings for the OAuth client, resolved from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub token_url: String,
    pub authorize_url: String,
    pub timeout: Duration,
}

/// Token set returned by a successful refresh or exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Possibly rotated; always replaces the stored refresh token.
    pub refresh_token: String,
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &crate::token::mask_token(&self.access_token))
            .field("refresh_token", &crate::token::mask_token(&self.refresh_token))
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Outcome of one refresh or code-exchange attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshResult {
    Success(TokenGrant),
    /// The refresh token is invalid or revoked. Terminal: a human must
    /// re-authorize.
    InvalidRefreshToken { message: String },
    /// The authorization code is invalid, expired, or already used.
    InvalidGrant { message: String },
    /// Timeout or transport failure. Safe to retry later.
    NetworkError { message: String },
    /// The vendor rejected the request for another reason.
    ApiError { vendor_status: Option<i64>, message: String },
    /// Required credentials are missing; no request was made.
    ConfigurationError { missing: Vec<String> },
}

impl RefreshResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn grant(&self) -> Option<&TokenGrant> {
        match self {
            Self::Success(grant) => Some(grant),
            _ => None,
        }
    }

    /// A human has to go through the consent screen again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, Self::InvalidRefreshToken { .. } | Self::InvalidGrant { .. })
    }

    /// Retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError { .. } | Self::ApiError { .. })
    }

    /// Short machine-readable kind, used in logs and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::InvalidRefreshToken { .. } => "invalid_refresh_token",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::NetworkError { .. } => "network_error",
            Self::ApiError { .. } => "api_error",
            Self::ConfigurationError { .. } => "configuration_error",
        }
    }

    /// Human-readable description of a failure (empty for success).
    pub fn message(&self) -> String {
        match self {
            Self::Success(_) => String::new(),
            Self::InvalidRefreshToken { message }
            | Self::InvalidGrant { message }
            | Self::NetworkError { message } => message.clone(),
            Self::ApiError { vendor_status: Some(status), message } => {
                format!("{message} (status {status})")
            }
            Self::ApiError { vendor_status: None, message } => message.clone(),
            Self::ConfigurationError { missing } => {
                format!("missing configuration: {}", missing.join(", "))
            }
        }
    }
}
