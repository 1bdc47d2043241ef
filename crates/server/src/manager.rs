// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single refresh flow: vendor call, state replacement, publish,
//! optional redeploy.
//!
//! Every caller (scheduler, admin API, OAuth callback, CLI) goes through
//! [`TokenManager`], which serializes flows on one lock held from reading the
//! refresh token until the publish finishes. Two refresh results can
//! therefore never be applied out of order, and a rotated refresh token is
//! never used after it was replaced.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::oauth::{self, OAuthClient, RefreshResult};
use crate::publish::{PublishResult, RailwayPublisher};
use crate::scheduler::{CycleReport, RefreshCycle};
use crate::token::{TokenState, TokenStore};

/// How long an issued OAuth `state` stays redeemable, in seconds.
const PENDING_STATE_TTL_SECS: i64 = 600;

fn is_live(issued: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now - issued).num_seconds() < PENDING_STATE_TTL_SECS
}

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Refresh is due this long before expiry.
    pub refresh_buffer: Duration,
    /// Publish after scheduled refreshes and callback exchanges.
    pub persist_on_refresh: bool,
    /// Redeploy after a successful scheduled publish.
    pub redeploy_on_refresh: bool,
    /// Refresh token from configuration, used when nothing is stored yet.
    pub bootstrap_refresh_token: Option<String>,
}

/// What a refresh flow should do besides calling the vendor.
#[derive(Debug, Clone, Default)]
pub struct RefreshRequest {
    /// Overrides the stored refresh token.
    pub refresh_token: Option<String>,
    pub persist: bool,
    /// Only honored after a successful publish.
    pub redeploy: bool,
}

/// Result of one refresh or exchange flow.
///
/// The vendor outcome and the persistence outcome are reported separately: a
/// refresh can succeed while publishing it fails.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub refresh: RefreshResult,
    /// Token state after a successful grant.
    pub token: Option<TokenState>,
    pub persistence: Option<PublishResult>,
    pub redeploy: Option<PublishResult>,
    /// Set when a human has to re-authorize.
    pub authorization_url: Option<String>,
}

impl RefreshOutcome {
    fn from_result(refresh: RefreshResult) -> Self {
        Self { refresh, token: None, persistence: None, redeploy: None, authorization_url: None }
    }

    /// One log line per flow, at a level matching the outcome.
    pub fn log(&self, source: &str) {
        let persisted = self.persistence.as_ref().map_or("skipped", PublishResult::kind);
        match &self.refresh {
            RefreshResult::Success(grant) => {
                info!(
                    source,
                    expires_at = %grant.expires_at,
                    persisted,
                    redeploy = self.redeploy.as_ref().map_or("skipped", PublishResult::kind),
                    "token refreshed"
                );
                if let Some(p) = self.persistence.as_ref().filter(|p| !p.is_success()) {
                    warn!(source, err = %p.message(), "refreshed token was not persisted");
                }
            }
            r if r.requires_reauthorization() => {
                error!(
                    source,
                    kind = r.kind(),
                    err = %r.message(),
                    authorization_url = self.authorization_url.as_deref().unwrap_or("unavailable"),
                    "re-authorization required"
                );
            }
            r => warn!(source, kind = r.kind(), err = %r.message(), "token refresh failed"),
        }
    }
}

/// A consent URL and the `state` it was issued with.
#[derive(Debug, Clone, Serialize)]
pub struct Authorization {
    pub url: String,
    pub state: String,
}

pub struct TokenManager {
    store: Arc<TokenStore>,
    oauth: OAuthClient,
    publisher: RailwayPublisher,
    settings: ManagerSettings,
    refresh_lock: Mutex<()>,
    /// Issued OAuth `state` values, keyed by state, with their issue time.
    pending_states: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl TokenManager {
    pub fn new(
        store: Arc<TokenStore>,
        oauth: OAuthClient,
        publisher: RailwayPublisher,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            store,
            oauth,
            publisher,
            settings,
            refresh_lock: Mutex::new(()),
            pending_states: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    pub fn publisher(&self) -> &RailwayPublisher {
        &self.publisher
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Request used by scheduled cycles.
    pub fn scheduled_request(&self) -> RefreshRequest {
        RefreshRequest {
            refresh_token: None,
            persist: self.settings.persist_on_refresh,
            redeploy: self.settings.redeploy_on_refresh,
        }
    }

    /// Run one refresh flow.
    pub async fn refresh(&self, request: RefreshRequest) -> RefreshOutcome {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked(request).await
    }

    async fn refresh_locked(&self, request: RefreshRequest) -> RefreshOutcome {
        let refresh_token = match request.refresh_token.filter(|t| !t.trim().is_empty()) {
            Some(token) => Some(token),
            None => match self.store.current().await {
                Some(state) => Some(state.refresh_token),
                None => self.settings.bootstrap_refresh_token.clone(),
            },
        };

        let result = self.oauth.refresh(refresh_token.as_deref()).await;
        self.settle(result, request.persist, request.redeploy).await
    }

    /// Apply a vendor result: replace state and publish on success, flag
    /// re-authorization on a terminal rejection.
    async fn settle(&self, result: RefreshResult, persist: bool, redeploy: bool) -> RefreshOutcome {
        let mut outcome = RefreshOutcome::from_result(result);
        match &outcome.refresh {
            RefreshResult::Success(grant) => {
                let state = self.store.apply(grant).await;
                if persist {
                    let published = self.publisher.publish(&state).await;
                    if redeploy && published.is_success() {
                        outcome.redeploy = Some(self.publisher.trigger_redeploy().await);
                    }
                    outcome.persistence = Some(published);
                }
                outcome.token = Some(state);
            }
            r if r.requires_reauthorization() => {
                let reason = r.message();
                self.store.mark_reauthorization_required(reason).await;
                match self.begin_authorization(None).await {
                    Ok(auth) => outcome.authorization_url = Some(auth.url),
                    Err(e) => warn!(err = %e, "could not build authorization URL"),
                }
            }
            _ => {}
        }
        outcome
    }

    /// Exchange an authorization code for the initial token set.
    pub async fn exchange_code(&self, code: &str, persist: bool) -> RefreshOutcome {
        let _guard = self.refresh_lock.lock().await;
        let result = self.oauth.exchange_code(code).await;
        if let RefreshResult::InvalidGrant { message } = &result {
            // A bad code says nothing about the stored refresh token.
            warn!(err = %message, "authorization code rejected");
            let mut outcome = RefreshOutcome::from_result(result);
            outcome.authorization_url = self.begin_authorization(None).await.ok().map(|a| a.url);
            return outcome;
        }
        self.settle(result, persist, false).await
    }

    /// Issue a consent URL. A random `state` is generated when none is given;
    /// either way it is recorded for [`Self::complete_authorization`].
    pub async fn begin_authorization(&self, state: Option<String>) -> anyhow::Result<Authorization> {
        let state = state.filter(|s| !s.is_empty()).unwrap_or_else(oauth::generate_state);
        let url = self.oauth.authorization_url(Some(&state))?;

        let now = Utc::now();
        let mut pending = self.pending_states.write().await;
        pending.retain(|_, issued| is_live(*issued, now));
        pending.insert(state.clone(), now);
        Ok(Authorization { url, state })
    }

    /// Redeem a callback. `None` when `state` was never issued, has expired,
    /// or was already used.
    pub async fn complete_authorization(&self, state: &str, code: &str) -> Option<RefreshOutcome> {
        let issued = self.pending_states.write().await.remove(state)?;
        if !is_live(issued, Utc::now()) {
            return None;
        }
        Some(self.exchange_code(code, self.settings.persist_on_refresh).await)
    }

    /// Seed the store from the Railway variables. `Ok(false)` when the store
    /// holds no complete token state.
    pub async fn recover_from_store(&self) -> anyhow::Result<bool> {
        let vars = self.publisher.fetch_variables().await?;
        let Some(state) = TokenState::from_variables(&vars) else {
            return Ok(false);
        };
        let _guard = self.refresh_lock.lock().await;
        self.store.seed(state).await;
        Ok(true)
    }

    async fn cycle(&self) -> CycleReport {
        let _guard = self.refresh_lock.lock().await;
        let now = Utc::now();
        let buffer = self.settings.refresh_buffer;

        if let Some(reason) = self.store.reauthorization_required().await {
            return CycleReport::Skipped {
                reason: format!("re-authorization required: {reason}"),
                next_due: None,
            };
        }
        if let Some(current) = self.store.current().await {
            if !oauth::should_refresh_now_at(now, current.expires_at, buffer) {
                return CycleReport::Skipped {
                    reason: "token not yet due".to_owned(),
                    next_due: Some(oauth::next_refresh_time(current.expires_at, buffer)),
                };
            }
        }

        let outcome = self.refresh_locked(self.scheduled_request()).await;
        outcome.log("scheduler");
        match (&outcome.refresh, &outcome.token) {
            (RefreshResult::Success(_), Some(state)) => CycleReport::Refreshed {
                next_due: Some(oauth::next_refresh_time(state.expires_at, buffer)),
                persistence: outcome.persistence.as_ref().map(|p| p.kind().to_owned()),
            },
            (RefreshResult::NetworkError { message }, _) => {
                CycleReport::Failed { retryable: true, message: message.clone() }
            }
            (other, _) => CycleReport::Failed { retryable: false, message: other.message() },
        }
    }
}

impl RefreshCycle for TokenManager {
    fn run_cycle(&self) -> BoxFuture<'_, CycleReport> {
        Box::pin(self.cycle())
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
