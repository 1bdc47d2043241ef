// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Withings MCP: OAuth token lifecycle manager and MCP bridge for the
//! Withings health API.

pub mod config;
pub mod error;
pub mod manager;
pub mod mcp;
pub mod oauth;
pub mod publish;
pub mod scheduler;
pub mod state;
pub mod test_support;
pub mod token;
pub mod transport;
pub mod vendor;

use std::sync::{Arc, Once};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::state::AppState;
use crate::transport::build_router;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Build the outbound HTTP client shared by the vendor and Railway clients.
pub fn http_client(timeout: Duration) -> reqwest::Client {
    ensure_crypto();
    reqwest::Client::builder().timeout(timeout).build().unwrap_or_default()
}

/// Run the server until ctrl-c.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let state = Arc::new(AppState::new(config.clone(), shutdown.clone())?);

    if config.recover_from_store && state.manager.store().current().await.is_none() {
        match state.manager.recover_from_store().await {
            Ok(true) => info!("recovered token state from Railway variables"),
            Ok(false) => warn!("Railway variables hold no complete token state"),
            Err(e) => warn!(err = %e, "failed to recover token state from Railway"),
        }
    }

    if config.auto_refresh {
        state.scheduler.start().await;
    } else {
        info!("automatic token refresh disabled (AUTO_REFRESH_ENABLED=false)");
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received, shutting down");
            }
            shutdown.cancel();
        });
    }

    info!(
        admin = %config.admin_policy(),
        auto_refresh = config.auto_refresh,
        "withings-mcp listening on {addr}"
    );
    let router = build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    state.scheduler.stop().await;
    Ok(())
}
