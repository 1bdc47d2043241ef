// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: mock upstream servers and settings builders.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{StatusCode, Uri};
use axum::Router;
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::manager::ManagerSettings;
use crate::oauth::{OAuthSettings, DEFAULT_SCOPES};
use crate::publish::PublisherSettings;
use crate::token::TokenState;

/// One request seen by a [`MockServer`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub body: String,
}

/// Mock upstream answering every path with a scripted sequence of
/// `(status, body)` responses. The last response repeats once the script runs
/// out.
pub struct MockServer {
    pub addr: SocketAddr,
    calls: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    pub async fn start(responses: Vec<(u16, String)>) -> anyhow::Result<Self> {
        let calls = Arc::new(AtomicU32::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responses = Arc::new(responses);

        let app = {
            let calls = Arc::clone(&calls);
            let requests = Arc::clone(&requests);
            Router::new().fallback(move |uri: Uri, body: String| {
                let calls = Arc::clone(&calls);
                let requests = Arc::clone(&requests);
                let responses = Arc::clone(&responses);
                async move {
                    let idx = calls.fetch_add(1, Ordering::Relaxed) as usize;
                    if let Ok(mut seen) = requests.lock() {
                        seen.push(Recorded { path: uri.path().to_owned(), body });
                    }
                    let (status, body) = responses
                        .get(idx)
                        .or_else(|| responses.last())
                        .cloned()
                        .unwrap_or((500, "{}".to_owned()));
                    (
                        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                        [("content-type", "application/json")],
                        body,
                    )
                }
            })
        };

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Ok(Self { addr, calls, requests })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

/// Address nothing listens on, for transport-failure tests.
pub fn dead_url() -> String {
    "http://127.0.0.1:9/unreachable".to_owned()
}

/// Listener that accepts connections and never answers, for timeout tests.
/// Accepted sockets stay open for the life of the runtime.
pub async fn silent_url(path: &str) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    Ok(format!("http://{addr}{path}"))
}

/// Successful Withings token envelope.
pub fn token_body(access: &str, refresh: &str, expires_in: u64) -> String {
    serde_json::json!({
        "status": 0,
        "body": {
            "userid": 4242,
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": expires_in,
            "scope": DEFAULT_SCOPES,
            "token_type": "Bearer",
        }
    })
    .to_string()
}

/// Withings failure envelope.
pub fn vendor_error(status: i64, error: &str) -> String {
    serde_json::json!({ "status": status, "error": error }).to_string()
}

/// GraphQL success payload for `variableCollectionUpsert`.
pub fn graphql_ok() -> String {
    serde_json::json!({ "data": { "variableCollectionUpsert": true } }).to_string()
}

pub fn graphql_error(message: &str) -> String {
    serde_json::json!({ "errors": [{ "message": message }] }).to_string()
}

pub fn oauth_settings(token_url: &str) -> OAuthSettings {
    OAuthSettings {
        client_id: Some("client-id".to_owned()),
        client_secret: Some("client-secret".to_owned()),
        redirect_uri: "http://localhost:8000/auth/callback".to_owned(),
        scopes: DEFAULT_SCOPES.split(',').map(str::to_owned).collect(),
        token_url: token_url.to_owned(),
        authorize_url: crate::config::WITHINGS_AUTHORIZE_URL.to_owned(),
        timeout: Duration::from_secs(5),
    }
}

pub fn publisher_settings(api_url: &str) -> PublisherSettings {
    PublisherSettings {
        api_token: Some("railway-token".to_owned()),
        project_id: Some("project".to_owned()),
        service_id: Some("service".to_owned()),
        environment_id: Some("environment".to_owned()),
        api_url: api_url.to_owned(),
        timeout: Duration::from_secs(5),
    }
}

/// Publisher with no Railway credentials at all.
pub fn unconfigured_publisher(api_url: &str) -> PublisherSettings {
    PublisherSettings {
        api_token: None,
        project_id: None,
        service_id: None,
        environment_id: None,
        ..publisher_settings(api_url)
    }
}

pub fn manager_settings() -> ManagerSettings {
    ManagerSettings {
        refresh_buffer: Duration::from_secs(5400),
        persist_on_refresh: true,
        redeploy_on_refresh: false,
        bootstrap_refresh_token: None,
    }
}

pub fn token_state(expires_at: DateTime<Utc>) -> TokenState {
    TokenState {
        access_token: "stored-access-token".to_owned(),
        refresh_token: "stored-refresh-token".to_owned(),
        expires_at,
        last_refreshed_at: expires_at - chrono::TimeDelta::hours(3),
        user_id: Some("4242".to_owned()),
    }
}

/// Parse a [`Config`] from explicit arguments. Env fallbacks still apply.
pub fn config_from_args(args: &[&str]) -> anyhow::Result<Config> {
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        config: Config,
    }

    let argv = std::iter::once("withings-mcp").chain(args.iter().copied());
    Ok(Wrapper::try_parse_from(argv)?.config)
}

/// Extension trait to convert any `Display` error into `anyhow::Error`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Server state wired to a vendor and a Railway base URL (usually
/// [`MockServer::url`] of `""`). `extra` args are appended to the defaults.
pub fn app_state(
    vendor_base: &str,
    railway_base: &str,
    extra: &[&str],
) -> anyhow::Result<std::sync::Arc<crate::state::AppState>> {
    let token_url = format!("{vendor_base}/v2/oauth2");
    let railway_url = format!("{railway_base}/graphql/v2");
    let mut args = vec![
        "--client-id",
        "client-id",
        "--client-secret",
        "client-secret",
        "--token-url",
        token_url.as_str(),
        "--api-url",
        vendor_base,
        "--railway-api-url",
        railway_url.as_str(),
        "--railway-api-token",
        "railway-token",
        "--railway-project-id",
        "project",
        "--railway-service-id",
        "service",
        "--railway-environment-id",
        "environment",
        "--http-timeout-secs",
        "5",
    ];
    args.extend_from_slice(extra);
    let config = config_from_args(&args)?;
    let state = crate::state::AppState::new(config, tokio_util::sync::CancellationToken::new())?;
    Ok(std::sync::Arc::new(state))
}
