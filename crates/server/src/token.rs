// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live OAuth token state for the single Withings account.
//!
//! [`TokenStore`] owns the authoritative [`TokenState`]. Every mutation
//! replaces the whole record under one write lock, so readers see either the
//! previous token set or the new one, never a mix.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::oauth::TokenGrant;
use crate::publish::{
    VAR_ACCESS_TOKEN, VAR_EXPIRES_AT, VAR_LAST_REFRESHED, VAR_REFRESH_TOKEN,
};

/// OAuth credentials for one account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub last_refreshed_at: DateTime<Utc>,
    pub user_id: Option<String>,
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &mask_token(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .field("last_refreshed_at", &self.last_refreshed_at)
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl TokenState {
    /// The access token must not be used at or after `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Hours until expiry rounded to two decimals, `None` once expired.
    pub fn hours_remaining(&self, now: DateTime<Utc>) -> Option<f64> {
        if self.is_expired_at(now) {
            return None;
        }
        let secs = (self.expires_at - now).num_seconds() as f64;
        Some((secs / 3600.0 * 100.0).round() / 100.0)
    }

    /// Flat string variables in the layout the external store keeps.
    pub fn to_variables(&self) -> Vec<(&'static str, String)> {
        vec![
            (VAR_ACCESS_TOKEN, self.access_token.clone()),
            (VAR_REFRESH_TOKEN, self.refresh_token.clone()),
            (VAR_EXPIRES_AT, self.expires_at.to_rfc3339()),
            (VAR_LAST_REFRESHED, self.last_refreshed_at.to_rfc3339()),
        ]
    }

    /// Rebuild state from stored variables. `None` when either token is absent
    /// or a timestamp does not parse.
    pub fn from_variables(vars: &HashMap<String, String>) -> Option<Self> {
        let get = |name: &str| vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());
        let parse = |name: &str| {
            get(name)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|t| t.with_timezone(&Utc))
        };
        Some(Self {
            access_token: get(VAR_ACCESS_TOKEN)?.to_owned(),
            refresh_token: get(VAR_REFRESH_TOKEN)?.to_owned(),
            expires_at: parse(VAR_EXPIRES_AT)?,
            last_refreshed_at: parse(VAR_LAST_REFRESHED).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            user_id: None,
        })
    }
}

/// Mask a secret for display: last three characters only.
pub fn mask_token(token: &str) -> String {
    if token.is_empty() {
        return "[NONE]".to_owned();
    }
    let count = token.chars().count();
    if count < 10 {
        return "[MASKED]".to_owned();
    }
    let tail: String = token.chars().skip(count - 3).collect();
    format!("*****{tail}")
}

/// Serializable snapshot for the status API. Secrets appear masked only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenStatus {
    pub status: TokenValidity,
    pub token_exists: bool,
    pub is_expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refreshed: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub reauthorization_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reauthorization_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenValidity {
    Valid,
    Expired,
    Missing,
}

#[derive(Debug, Default)]
struct Inner {
    token: Option<TokenState>,
    /// Set when the vendor rejected the refresh token; cleared by the next
    /// successful grant.
    reauth_reason: Option<String>,
}

/// Owner of the live token state.
#[derive(Debug, Default)]
pub struct TokenStore {
    inner: RwLock<Inner>,
}

impl TokenStore {
    pub fn new(initial: Option<TokenState>) -> Self {
        Self { inner: RwLock::new(Inner { token: initial, reauth_reason: None }) }
    }

    pub async fn current(&self) -> Option<TokenState> {
        self.inner.read().await.token.clone()
    }

    /// Replace the whole record from a successful grant.
    pub async fn apply(&self, grant: &TokenGrant) -> TokenState {
        self.apply_at(grant, Utc::now()).await
    }

    pub async fn apply_at(&self, grant: &TokenGrant, now: DateTime<Utc>) -> TokenState {
        let mut inner = self.inner.write().await;
        let previous_user = inner.token.as_ref().and_then(|t| t.user_id.clone());
        let next = TokenState {
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token.clone(),
            expires_at: grant.expires_at,
            last_refreshed_at: now,
            user_id: grant.user_id.clone().or(previous_user),
        };
        inner.token = Some(next.clone());
        inner.reauth_reason = None;
        next
    }

    /// Replace the record wholesale (startup seeding and store recovery).
    pub async fn seed(&self, state: TokenState) {
        let mut inner = self.inner.write().await;
        inner.token = Some(state);
    }

    /// True when there is no token or it has expired.
    pub async fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.inner.read().await.token.as_ref().map_or(true, |t| t.is_expired_at(now))
    }

    pub async fn hours_remaining(&self, now: DateTime<Utc>) -> Option<f64> {
        self.inner.read().await.token.as_ref().and_then(|t| t.hours_remaining(now))
    }

    /// Access token for a vendor call, only while it is still valid.
    pub async fn usable_access_token(&self, now: DateTime<Utc>) -> Option<String> {
        let inner = self.inner.read().await;
        let token = inner.token.as_ref()?;
        if token.is_expired_at(now) {
            return None;
        }
        Some(token.access_token.clone())
    }

    pub async fn mark_reauthorization_required(&self, reason: impl Into<String>) {
        self.inner.write().await.reauth_reason = Some(reason.into());
    }

    pub async fn reauthorization_required(&self) -> Option<String> {
        self.inner.read().await.reauth_reason.clone()
    }

    pub async fn status(&self, now: DateTime<Utc>) -> TokenStatus {
        let inner = self.inner.read().await;
        let reauth = inner.reauth_reason.clone();
        match inner.token.as_ref() {
            Some(t) => {
                let expired = t.is_expired_at(now);
                TokenStatus {
                    status: if expired { TokenValidity::Expired } else { TokenValidity::Valid },
                    token_exists: true,
                    is_expired: expired,
                    expires_at: Some(t.expires_at),
                    last_refreshed: (t.last_refreshed_at != DateTime::<Utc>::UNIX_EPOCH)
                        .then_some(t.last_refreshed_at),
                    expires_in_hours: t.hours_remaining(now),
                    user_id: t.user_id.clone(),
                    access_token: Some(mask_token(&t.access_token)),
                    refresh_token: Some(mask_token(&t.refresh_token)),
                    reauthorization_required: reauth.is_some(),
                    reauthorization_reason: reauth,
                }
            }
            None => TokenStatus {
                status: TokenValidity::Missing,
                token_exists: false,
                is_expired: false,
                expires_at: None,
                last_refreshed: None,
                expires_in_hours: None,
                user_id: None,
                access_token: None,
                refresh_token: None,
                reauthorization_required: reauth.is_some(),
                reauthorization_reason: reauth,
            },
        }
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
