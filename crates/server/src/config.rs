// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::ArgAction;

use crate::manager::ManagerSettings;
use crate::oauth::{OAuthSettings, DEFAULT_SCOPES};
use crate::publish::PublisherSettings;
use crate::scheduler::SchedulerSettings;
use crate::token::TokenState;

pub const WITHINGS_TOKEN_URL: &str = "https://wbsapi.withings.net/v2/oauth2";
pub const WITHINGS_AUTHORIZE_URL: &str = "https://account.withings.com/oauth2_user/authorize2";
pub const WITHINGS_API_URL: &str = "https://wbsapi.withings.net";
pub const RAILWAY_API_URL: &str = "https://backboard.railway.app/graphql/v2";

/// Configuration for the withings-mcp server.
///
/// Every setting can come from the environment, which is how the service is
/// deployed; flags exist for local runs and tests.
#[derive(Debug, Clone, clap::Args)]
pub struct Config {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000, env = "PORT")]
    pub port: u16,

    /// Log format: "json" or "text".
    #[arg(long, default_value = "json", env = "LOG_FORMAT")]
    pub log_format: String,

    /// Log filter directive (e.g. "info", "withings_mcp=debug").
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    // -- Withings OAuth ------------------------------------------------------
    #[arg(long, env = "WITHINGS_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "WITHINGS_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Access token to start with (normally written back by the publisher).
    #[arg(long, env = "WITHINGS_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Refresh token to start with.
    #[arg(long, env = "WITHINGS_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,

    /// Access token expiry, RFC 3339.
    #[arg(long, env = "WITHINGS_TOKEN_EXPIRES_AT")]
    pub token_expires_at: Option<String>,

    /// Last refresh timestamp, RFC 3339.
    #[arg(long, env = "WITHINGS_TOKEN_LAST_REFRESHED")]
    pub token_last_refreshed: Option<String>,

    #[arg(long, env = "WITHINGS_USER_ID")]
    pub user_id: Option<String>,

    #[arg(long, default_value = "http://localhost:8000/auth/callback", env = "WITHINGS_REDIRECT_URI")]
    pub redirect_uri: String,

    /// Comma-separated OAuth scopes.
    #[arg(long, default_value = DEFAULT_SCOPES, env = "WITHINGS_SCOPES")]
    pub scopes: String,

    #[arg(long, default_value = WITHINGS_TOKEN_URL, env = "WITHINGS_TOKEN_URL")]
    pub token_url: String,

    #[arg(long, default_value = WITHINGS_AUTHORIZE_URL, env = "WITHINGS_AUTHORIZE_URL")]
    pub authorize_url: String,

    #[arg(long, default_value = WITHINGS_API_URL, env = "WITHINGS_API_URL")]
    pub api_url: String,

    /// Timeout for every outbound HTTP call, in seconds.
    #[arg(long, default_value_t = 30, env = "HTTP_TIMEOUT_SECONDS")]
    pub http_timeout_secs: u64,

    // -- Railway persistence -------------------------------------------------
    #[arg(long, env = "RAILWAY_API_TOKEN", hide_env_values = true)]
    pub railway_api_token: Option<String>,

    #[arg(long, env = "RAILWAY_PROJECT_ID")]
    pub railway_project_id: Option<String>,

    #[arg(long, env = "RAILWAY_SERVICE_ID")]
    pub railway_service_id: Option<String>,

    #[arg(long, env = "RAILWAY_ENVIRONMENT_ID")]
    pub railway_environment_id: Option<String>,

    #[arg(long, default_value = RAILWAY_API_URL, env = "RAILWAY_API_URL")]
    pub railway_api_url: String,

    /// Publish refreshed tokens to Railway after scheduled refreshes.
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "PERSIST_ON_REFRESH")]
    pub persist_on_refresh: bool,

    /// Trigger a Railway redeploy after a successful scheduled publish.
    #[arg(long, default_value_t = false, action = ArgAction::Set, env = "REDEPLOY_ON_REFRESH")]
    pub redeploy_on_refresh: bool,

    /// Load token state from Railway at startup when none is configured.
    #[arg(long, default_value_t = false, action = ArgAction::Set, env = "RECOVER_FROM_STORE")]
    pub recover_from_store: bool,

    // -- Access control ------------------------------------------------------
    /// Shared secret expected in the `X-Admin-Token` header.
    #[arg(long, env = "ADMIN_API_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Leave admin endpoints open when no admin token is set. Closed otherwise.
    #[arg(long, default_value_t = false, action = ArgAction::Set, env = "ADMIN_OPEN")]
    pub admin_open: bool,

    /// Bearer token for the MCP endpoint. If unset, MCP auth is disabled.
    #[arg(long, env = "MCP_AUTH_TOKEN", hide_env_values = true)]
    pub mcp_auth_token: Option<String>,

    // -- Scheduler -----------------------------------------------------------
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "AUTO_REFRESH_ENABLED")]
    pub auto_refresh: bool,

    /// Seconds between scheduled refresh cycles.
    #[arg(long, default_value_t = 7200, env = "TOKEN_REFRESH_INTERVAL_SECONDS")]
    pub refresh_interval_secs: u64,

    /// A refresh is due this many seconds before the access token expires.
    #[arg(long, default_value_t = 5400, env = "TOKEN_REFRESH_BUFFER_SECONDS")]
    pub refresh_buffer_secs: u64,

    /// Delay before the first scheduled cycle.
    #[arg(long, default_value_t = 30, env = "SCHEDULER_STARTUP_DELAY_SECONDS")]
    pub startup_delay_secs: u64,

    /// Delay before retrying after a transient cycle failure.
    #[arg(long, default_value_t = 60, env = "SCHEDULER_ERROR_BACKOFF_SECONDS")]
    pub error_backoff_secs: u64,
}

/// Who may call the admin endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminPolicy {
    /// Callers must present this secret in `X-Admin-Token`.
    Token(String),
    /// No secret configured and `ADMIN_OPEN=true`: anyone may call.
    Open,
    /// No secret configured: every admin call is refused.
    Closed,
}

impl fmt::Display for AdminPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => f.write_str("token"),
            Self::Open => f.write_str("open"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

impl Config {
    /// Validate settings that clap cannot check on its own.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid --log-format {other:?}: expected json or text"),
        }
        if self.refresh_interval_secs == 0 {
            anyhow::bail!("TOKEN_REFRESH_INTERVAL_SECONDS must be greater than zero");
        }
        if self.error_backoff_secs == 0 {
            anyhow::bail!("SCHEDULER_ERROR_BACKOFF_SECONDS must be greater than zero");
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("HTTP_TIMEOUT_SECONDS must be greater than zero");
        }
        url::Url::parse(&self.redirect_uri)
            .map_err(|e| anyhow::anyhow!("invalid WITHINGS_REDIRECT_URI: {e}"))?;
        url::Url::parse(&self.authorize_url)
            .map_err(|e| anyhow::anyhow!("invalid WITHINGS_AUTHORIZE_URL: {e}"))?;
        if self.scope_list().is_empty() {
            anyhow::bail!("WITHINGS_SCOPES must name at least one scope");
        }
        self.initial_token_state()?;
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn scope_list(&self) -> Vec<String> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn admin_policy(&self) -> AdminPolicy {
        match non_empty(&self.admin_token) {
            Some(token) => AdminPolicy::Token(token),
            None if self.admin_open => AdminPolicy::Open,
            None => AdminPolicy::Closed,
        }
    }

    pub fn oauth_settings(&self) -> OAuthSettings {
        OAuthSettings {
            client_id: non_empty(&self.client_id),
            client_secret: non_empty(&self.client_secret),
            redirect_uri: self.redirect_uri.clone(),
            scopes: self.scope_list(),
            token_url: self.token_url.clone(),
            authorize_url: self.authorize_url.clone(),
            timeout: self.http_timeout(),
        }
    }

    pub fn publisher_settings(&self) -> PublisherSettings {
        PublisherSettings {
            api_token: non_empty(&self.railway_api_token),
            project_id: non_empty(&self.railway_project_id),
            service_id: non_empty(&self.railway_service_id),
            environment_id: non_empty(&self.railway_environment_id),
            api_url: self.railway_api_url.clone(),
            timeout: self.http_timeout(),
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            interval: Duration::from_secs(self.refresh_interval_secs),
            startup_delay: Duration::from_secs(self.startup_delay_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            buffer: Duration::from_secs(self.refresh_buffer_secs),
        }
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            refresh_buffer: Duration::from_secs(self.refresh_buffer_secs),
            persist_on_refresh: self.persist_on_refresh,
            redeploy_on_refresh: self.redeploy_on_refresh,
            bootstrap_refresh_token: non_empty(&self.refresh_token),
        }
    }

    /// Token state described by the `WITHINGS_*` environment, if complete.
    ///
    /// Access and refresh token are both required. A missing expiry means the
    /// token is treated as already expired, so the first cycle refreshes it.
    pub fn initial_token_state(&self) -> anyhow::Result<Option<TokenState>> {
        let (Some(access_token), Some(refresh_token)) =
            (non_empty(&self.access_token), non_empty(&self.refresh_token))
        else {
            return Ok(None);
        };
        let expires_at = parse_timestamp("WITHINGS_TOKEN_EXPIRES_AT", &self.token_expires_at)?;
        let last_refreshed_at =
            parse_timestamp("WITHINGS_TOKEN_LAST_REFRESHED", &self.token_last_refreshed)?;
        Ok(Some(TokenState {
            access_token,
            refresh_token,
            expires_at: expires_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            last_refreshed_at: last_refreshed_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            user_id: non_empty(&self.user_id),
        }))
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_owned)
}

/// Parse an optional RFC 3339 timestamp, accepting a trailing `Z` or offset.
pub fn parse_timestamp(name: &str, value: &Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    let Some(raw) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| anyhow::anyhow!("invalid {name} {raw:?}: {e}"))?;
    Ok(Some(parsed.with_timezone(&Utc)))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
