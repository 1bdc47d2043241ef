// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use super::{mask_token, TokenState, TokenStore, TokenValidity};
use crate::oauth::TokenGrant;
use crate::test_support::token_state;

fn grant(access: &str, refresh: &str, expires_at: DateTime<Utc>) -> TokenGrant {
    TokenGrant {
        access_token: access.to_owned(),
        refresh_token: refresh.to_owned(),
        expires_in: 10_800,
        expires_at,
        user_id: None,
        scope: None,
    }
}

#[yare::parameterized(
    empty = { "", "[NONE]" },
    short = { "abc123", "[MASKED]" },
    nine_chars = { "123456789", "[MASKED]" },
    ten_chars = { "1234567890", "*****890" },
    long = { "a-very-long-access-token-xyz", "*****xyz" },
)]
fn masking(token: &str, expected: &str) {
    assert_eq!(mask_token(token), expected);
}

#[test]
fn debug_output_masks_secrets() {
    let state = token_state(Utc::now());
    let rendered = format!("{state:?}");
    assert!(!rendered.contains("stored-access-token"));
    assert!(!rendered.contains("stored-refresh-token"));
    assert!(rendered.contains("*****ken"));
}

#[test]
fn expiry_is_inclusive() {
    let expires_at = Utc::now();
    let state = token_state(expires_at);
    assert!(state.is_expired_at(expires_at));
    assert!(!state.is_expired_at(expires_at - TimeDelta::seconds(1)));
}

#[test]
fn hours_remaining_rounds_to_two_decimals() {
    let now = Utc::now();
    let state = token_state(now + TimeDelta::seconds(5_000));
    assert_eq!(state.hours_remaining(now), Some(1.39));
    assert_eq!(state.hours_remaining(now + TimeDelta::seconds(5_000)), None);
}

#[tokio::test]
async fn apply_replaces_whole_record_and_keeps_user() {
    let now = Utc::now();
    let store = TokenStore::new(Some(token_state(now - TimeDelta::minutes(1))));
    store.mark_reauthorization_required("revoked").await;

    let expires_at = now + TimeDelta::hours(3);
    let applied = store.apply_at(&grant("access-2", "refresh-2", expires_at), now).await;

    assert_eq!(applied.access_token, "access-2");
    assert_eq!(applied.refresh_token, "refresh-2");
    assert_eq!(applied.expires_at, expires_at);
    assert_eq!(applied.last_refreshed_at, now);
    assert_eq!(applied.user_id.as_deref(), Some("4242"));
    assert_eq!(store.current().await, Some(applied));
    assert!(store.reauthorization_required().await.is_none());
}

#[tokio::test]
async fn unchanged_refresh_token_is_still_written() {
    let now = Utc::now();
    let store = TokenStore::new(Some(token_state(now)));
    let same = grant("access-2", "stored-refresh-token", now + TimeDelta::hours(3));
    let applied = store.apply_at(&same, now).await;
    assert_eq!(applied.refresh_token, "stored-refresh-token");
    assert_eq!(applied.access_token, "access-2");
}

#[tokio::test]
async fn readers_never_see_a_mixed_record() {
    let now = Utc::now();
    let store = Arc::new(TokenStore::new(Some(token_state(now))));

    let reader = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for _ in 0..500 {
                let Some(state) = store.current().await else { continue };
                let old = state.access_token == "stored-access-token"
                    && state.refresh_token == "stored-refresh-token";
                let new = state.access_token.starts_with("access-")
                    && state.refresh_token.trim_start_matches("refresh-")
                        == state.access_token.trim_start_matches("access-");
                assert!(old || new, "mixed record: {state:?}");
                tokio::task::yield_now().await;
            }
        })
    };

    for i in 0..500 {
        let g = grant(&format!("access-{i}"), &format!("refresh-{i}"), now + TimeDelta::hours(3));
        store.apply(&g).await;
        tokio::task::yield_now().await;
    }
    assert!(reader.await.is_ok());
}

#[tokio::test]
async fn usable_access_token_refused_after_expiry() {
    let now = Utc::now();
    let store = TokenStore::new(Some(token_state(now + TimeDelta::minutes(1))));
    assert_eq!(store.usable_access_token(now).await.as_deref(), Some("stored-access-token"));
    assert_eq!(store.usable_access_token(now + TimeDelta::minutes(1)).await, None);
    assert!(store.is_expired(now + TimeDelta::minutes(2)).await);

    let empty = TokenStore::new(None);
    assert_eq!(empty.usable_access_token(now).await, None);
    assert!(empty.is_expired(now).await);
}

#[tokio::test]
async fn status_reports_masked_tokens() -> anyhow::Result<()> {
    let now = Utc::now();
    let store = TokenStore::new(Some(token_state(now + TimeDelta::hours(2))));
    let status = store.status(now).await;

    assert_eq!(status.status, TokenValidity::Valid);
    assert!(status.token_exists);
    assert_eq!(status.expires_in_hours, Some(2.0));
    let rendered = serde_json::to_string(&status)?;
    assert!(!rendered.contains("stored-access-token"));
    assert!(rendered.contains("\"status\":\"valid\""));
    Ok(())
}

#[tokio::test]
async fn status_without_token_is_missing() {
    let store = TokenStore::new(None);
    store.mark_reauthorization_required("revoked").await;
    let status = store.status(Utc::now()).await;
    assert_eq!(status.status, TokenValidity::Missing);
    assert!(!status.token_exists);
    assert!(status.reauthorization_required);
    assert_eq!(status.reauthorization_reason.as_deref(), Some("revoked"));
}

#[test]
fn from_variables_requires_both_tokens() {
    let state = token_state(Utc::now());
    let mut vars: HashMap<String, String> =
        state.to_variables().into_iter().map(|(k, v)| (k.to_owned(), v)).collect();
    assert_eq!(TokenState::from_variables(&vars).map(|s| s.refresh_token), Some(state.refresh_token));

    vars.insert("WITHINGS_REFRESH_TOKEN".to_owned(), "  ".to_owned());
    assert!(TokenState::from_variables(&vars).is_none());
}
