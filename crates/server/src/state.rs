// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::manager::TokenManager;
use crate::oauth::OAuthClient;
use crate::publish::RailwayPublisher;
use crate::scheduler::{RefreshCycle, RefreshScheduler};
use crate::token::TokenStore;
use crate::vendor::WithingsApi;

/// Shared server state.
pub struct AppState {
    pub config: Config,
    pub manager: Arc<TokenManager>,
    pub scheduler: RefreshScheduler,
    /// Data client for the MCP tools; reads the same store as the manager.
    pub vendor: WithingsApi,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let store = Arc::new(TokenStore::new(config.initial_token_state()?));
        let manager = Arc::new(TokenManager::new(
            Arc::clone(&store),
            OAuthClient::new(config.oauth_settings()),
            RailwayPublisher::new(config.publisher_settings()),
            config.manager_settings(),
        ));
        let cycle: Arc<dyn RefreshCycle> = manager.clone();
        let scheduler =
            RefreshScheduler::new(config.scheduler_settings(), cycle, shutdown.clone());
        let vendor = WithingsApi::new(&config.api_url, config.http_timeout(), store);
        Ok(Self { config, manager, scheduler, vendor, shutdown })
    }
}
