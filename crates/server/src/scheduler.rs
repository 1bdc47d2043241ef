// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic background refresh.
//!
//! One tokio task sleeps, runs a [`RefreshCycle`], and picks the next delay
//! from the cycle's report. A failed or panicking cycle never ends the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub startup_delay: Duration,
    /// Delay after a transient failure, used instead of `interval`.
    pub error_backoff: Duration,
    /// Reported in status; the cycle itself applies it.
    pub buffer: Duration,
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleReport {
    Refreshed {
        next_due: Option<DateTime<Utc>>,
        /// Publish outcome kind, absent when publishing is off.
        persistence: Option<String>,
    },
    Skipped {
        reason: String,
        next_due: Option<DateTime<Utc>>,
    },
    Failed {
        /// Transient: retry after the error backoff.
        retryable: bool,
        message: String,
    },
}

/// One unit of scheduled work.
pub trait RefreshCycle: Send + Sync + 'static {
    fn run_cycle(&self) -> BoxFuture<'_, CycleReport>;
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleRecord {
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub report: CycleReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_seconds: u64,
    pub buffer_seconds: u64,
    pub error_backoff_seconds: u64,
    pub startup_delay_seconds: u64,
    pub cycles_completed: u64,
    pub last_cycle: Option<CycleRecord>,
    pub next_cycle_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Stats {
    cycles_completed: u64,
    last_cycle: Option<CycleRecord>,
    next_cycle_at: Option<DateTime<Utc>>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct RefreshScheduler {
    settings: SchedulerSettings,
    cycle: Arc<dyn RefreshCycle>,
    /// Parent token; cancelling it (process shutdown) stops the loop too.
    shutdown: CancellationToken,
    running: Mutex<Option<Running>>,
    stats: Arc<RwLock<Stats>>,
}

impl RefreshScheduler {
    pub fn new(
        settings: SchedulerSettings,
        cycle: Arc<dyn RefreshCycle>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            cycle,
            shutdown,
            running: Mutex::new(None),
            stats: Arc::new(RwLock::new(Stats::default())),
        }
    }

    /// Start the loop. Returns `false` (and changes nothing) when it is
    /// already running or shutdown has begun.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            warn!("refresh scheduler already running");
            return false;
        }
        if self.shutdown.is_cancelled() {
            warn!("refresh scheduler not started, shutdown in progress");
            return false;
        }

        let cancel = self.shutdown.child_token();
        let handle = tokio::spawn(run_loop(
            self.settings.clone(),
            Arc::clone(&self.cycle),
            Arc::clone(&self.stats),
            cancel.clone(),
        ));
        *running = Some(Running { cancel, handle });
        info!(
            interval_secs = self.settings.interval.as_secs(),
            startup_delay_secs = self.settings.startup_delay.as_secs(),
            "refresh scheduler started"
        );
        true
    }

    /// Stop the loop. A pending sleep is cut short; a cycle already in flight
    /// runs to completion first. Returns `false` when it was not running.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.running.lock().await.take() else {
            return false;
        };
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            warn!(err = %e, "refresh scheduler task ended abnormally");
        }
        info!("refresh scheduler stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.as_ref().is_some_and(|r| !r.handle.is_finished())
    }

    pub async fn status(&self) -> SchedulerStatus {
        let running = self.is_running().await;
        let stats = self.stats.read().await;
        SchedulerStatus {
            running,
            interval_seconds: self.settings.interval.as_secs(),
            buffer_seconds: self.settings.buffer.as_secs(),
            error_backoff_seconds: self.settings.error_backoff.as_secs(),
            startup_delay_seconds: self.settings.startup_delay.as_secs(),
            cycles_completed: stats.cycles_completed,
            last_cycle: stats.last_cycle.clone(),
            next_cycle_at: if running { stats.next_cycle_at } else { None },
        }
    }
}

async fn run_loop(
    settings: SchedulerSettings,
    cycle: Arc<dyn RefreshCycle>,
    stats: Arc<RwLock<Stats>>,
    cancel: CancellationToken,
) {
    let mut delay = settings.startup_delay;
    loop {
        stats.write().await.next_cycle_at =
            chrono::TimeDelta::from_std(delay).ok().and_then(|d| Utc::now().checked_add_signed(d));

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        // Run in its own task so a panic surfaces as a JoinError.
        let task_cycle = Arc::clone(&cycle);
        let report = match tokio::spawn(async move { task_cycle.run_cycle().await }).await {
            Ok(report) => report,
            Err(e) => CycleReport::Failed { retryable: true, message: format!("refresh cycle aborted: {e}") },
        };

        let now = Utc::now();
        match &report {
            CycleReport::Refreshed { next_due, .. } => debug!(?next_due, "scheduled refresh completed"),
            CycleReport::Skipped { reason, next_due } => {
                debug!(reason = %reason, ?next_due, "scheduled refresh skipped")
            }
            CycleReport::Failed { retryable, message } => {
                warn!(retryable, err = %message, "scheduled refresh failed")
            }
        }
        delay = next_delay(&settings, &report, now);

        let mut stats = stats.write().await;
        stats.cycles_completed += 1;
        stats.last_cycle = Some(CycleRecord { finished_at: now, report });
    }
    stats.write().await.next_cycle_at = None;
}

/// Delay before the cycle after `report`.
///
/// Transient failures back off; other failures wait the interval. After a
/// success or skip the loop wakes at the token's due time if that comes
/// before the next interval tick, so a manual refresh cannot push the next
/// refresh past expiry.
pub(crate) fn next_delay(settings: &SchedulerSettings, report: &CycleReport, now: DateTime<Utc>) -> Duration {
    match report {
        CycleReport::Failed { retryable: true, .. } => settings.error_backoff,
        CycleReport::Failed { retryable: false, .. } => settings.interval,
        CycleReport::Refreshed { next_due, .. } | CycleReport::Skipped { next_due, .. } => {
            let until_due = next_due
                .and_then(|due| (due - now).to_std().ok())
                .filter(|until| !until.is_zero());
            match until_due {
                Some(until) => until.min(settings.interval).max(Duration::from_secs(1)),
                None => settings.interval,
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
