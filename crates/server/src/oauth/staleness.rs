// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh due-time arithmetic.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Earliest instant at which a token expiring at `expires_at` should be
/// refreshed: `expires_at - buffer`.
pub fn next_refresh_time(expires_at: DateTime<Utc>, buffer: Duration) -> DateTime<Utc> {
    chrono::TimeDelta::from_std(buffer)
        .ok()
        .and_then(|buffer| expires_at.checked_sub_signed(buffer))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// True iff `now >= expires_at - buffer`.
pub fn should_refresh_now_at(now: DateTime<Utc>, expires_at: DateTime<Utc>, buffer: Duration) -> bool {
    now >= next_refresh_time(expires_at, buffer)
}

pub fn should_refresh_now(expires_at: DateTime<Utc>, buffer: Duration) -> bool {
    should_refresh_now_at(Utc::now(), expires_at, buffer)
}

#[cfg(test)]
#[path = "staleness_tests.rs"]
mod tests;
