// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::{next_delay, CycleReport, RefreshCycle, RefreshScheduler, SchedulerSettings};

/// Cycle returning scripted reports; the last one repeats.
struct ScriptedCycle {
    calls: AtomicU32,
    reports: Vec<CycleReport>,
    work: Duration,
    panic_first: bool,
}

impl ScriptedCycle {
    fn new(reports: Vec<CycleReport>) -> Arc<Self> {
        Arc::new(Self { calls: AtomicU32::new(0), reports, work: Duration::ZERO, panic_first: false })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RefreshCycle for ScriptedCycle {
    fn run_cycle(&self) -> BoxFuture<'_, CycleReport> {
        Box::pin(async move {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            if self.panic_first && idx == 0 {
                panic!("cycle exploded");
            }
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }
            self.reports
                .get(idx)
                .or_else(|| self.reports.last())
                .cloned()
                .unwrap_or(CycleReport::Skipped { reason: "empty script".to_owned(), next_due: None })
        })
    }
}

fn settings() -> SchedulerSettings {
    SchedulerSettings {
        interval: Duration::from_secs(100),
        startup_delay: Duration::from_secs(30),
        error_backoff: Duration::from_secs(60),
        buffer: Duration::from_secs(5400),
    }
}

fn refreshed() -> CycleReport {
    CycleReport::Refreshed { next_due: None, persistence: None }
}

fn network_failure() -> CycleReport {
    CycleReport::Failed { retryable: true, message: "timeout".to_owned() }
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn double_start_runs_one_loop() {
    let cycle = ScriptedCycle::new(vec![refreshed()]);
    let scheduler = RefreshScheduler::new(settings(), cycle.clone(), CancellationToken::new());

    assert!(scheduler.start().await);
    assert!(!scheduler.start().await);

    advance(31).await;
    assert_eq!(cycle.calls(), 1);
    advance(100).await;
    assert_eq!(cycle.calls(), 2);

    assert!(scheduler.stop().await);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_retries_after_backoff() {
    let cycle = ScriptedCycle::new(vec![network_failure(), refreshed()]);
    let scheduler = RefreshScheduler::new(settings(), cycle.clone(), CancellationToken::new());
    scheduler.start().await;

    advance(31).await;
    assert_eq!(cycle.calls(), 1);
    advance(58).await; // t = 89
    assert_eq!(cycle.calls(), 1);
    advance(2).await; // t = 91
    assert_eq!(cycle.calls(), 2);

    let status = scheduler.status().await;
    assert_eq!(status.cycles_completed, 2);
    assert!(status.running);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn vendor_error_waits_full_interval() {
    let failure = CycleReport::Failed { retryable: false, message: "status 601".to_owned() };
    let cycle = ScriptedCycle::new(vec![failure, refreshed()]);
    let scheduler = RefreshScheduler::new(settings(), cycle.clone(), CancellationToken::new());
    scheduler.start().await;

    advance(31).await;
    advance(60).await; // t = 91, past the backoff
    assert_eq!(cycle.calls(), 1);
    advance(40).await; // t = 131
    assert_eq!(cycle.calls(), 2);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn panicking_cycle_does_not_end_loop() {
    let cycle = Arc::new(ScriptedCycle {
        calls: AtomicU32::new(0),
        reports: vec![refreshed()],
        work: Duration::ZERO,
        panic_first: true,
    });
    let scheduler = RefreshScheduler::new(settings(), cycle.clone(), CancellationToken::new());
    scheduler.start().await;

    advance(31).await;
    let status = scheduler.status().await;
    assert!(status.running);
    let last = status.last_cycle.map(|c| c.report);
    assert!(matches!(last, Some(CycleReport::Failed { retryable: true, .. })), "{last:?}");

    advance(60).await;
    assert_eq!(cycle.calls(), 2);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn start_after_shutdown_is_refused() {
    let cycle = ScriptedCycle::new(vec![refreshed()]);
    let shutdown = CancellationToken::new();
    let scheduler = RefreshScheduler::new(settings(), cycle.clone(), shutdown.clone());
    shutdown.cancel();

    assert!(!scheduler.start().await);
    assert!(!scheduler.is_running().await);
    assert!(!scheduler.status().await.running);

    advance(1_000).await;
    assert_eq!(cycle.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_cuts_pending_sleep() {
    let cycle = ScriptedCycle::new(vec![refreshed()]);
    let scheduler = RefreshScheduler::new(settings(), cycle.clone(), CancellationToken::new());
    scheduler.start().await;

    advance(5).await;
    assert!(scheduler.stop().await);
    assert!(!scheduler.is_running().await);
    assert!(!scheduler.stop().await);

    advance(1_000).await;
    assert_eq!(cycle.calls(), 0);
    assert_eq!(scheduler.status().await.next_cycle_at, None);
}

#[tokio::test(start_paused = true)]
async fn stop_lets_in_flight_cycle_finish() {
    let cycle = Arc::new(ScriptedCycle {
        calls: AtomicU32::new(0),
        reports: vec![refreshed()],
        work: Duration::from_secs(10),
        panic_first: false,
    });
    let scheduler = RefreshScheduler::new(settings(), cycle.clone(), CancellationToken::new());
    scheduler.start().await;

    advance(35).await; // cycle started at t = 30, finishes at t = 40
    assert_eq!(cycle.calls(), 1);
    assert_eq!(scheduler.status().await.cycles_completed, 0);

    scheduler.stop().await;
    assert_eq!(scheduler.status().await.cycles_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_token_stops_loop() {
    let shutdown = CancellationToken::new();
    let cycle = ScriptedCycle::new(vec![refreshed()]);
    let scheduler = RefreshScheduler::new(settings(), cycle.clone(), shutdown.clone());
    scheduler.start().await;

    shutdown.cancel();
    advance(1).await;
    assert!(!scheduler.is_running().await);
    assert_eq!(cycle.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn restart_after_stop() {
    let cycle = ScriptedCycle::new(vec![refreshed()]);
    let scheduler = RefreshScheduler::new(settings(), cycle.clone(), CancellationToken::new());

    scheduler.start().await;
    scheduler.stop().await;
    assert!(scheduler.start().await);
    advance(31).await;
    assert_eq!(cycle.calls(), 1);
    scheduler.stop().await;
}

#[tokio::test]
async fn status_reports_settings() {
    let scheduler =
        RefreshScheduler::new(settings(), ScriptedCycle::new(vec![]), CancellationToken::new());
    let status = scheduler.status().await;
    assert!(!status.running);
    assert_eq!(status.interval_seconds, 100);
    assert_eq!(status.buffer_seconds, 5400);
    assert_eq!(status.error_backoff_seconds, 60);
    assert_eq!(status.startup_delay_seconds, 30);
    assert_eq!(status.cycles_completed, 0);
    assert!(status.last_cycle.is_none());
}

#[yare::parameterized(
    due_before_interval = { Some(40), 40 },
    due_after_interval = { Some(500), 100 },
    due_in_past = { Some(-10), 100 },
    due_unknown = { None, 100 },
)]
fn delay_after_success_tracks_due_time(due_in_secs: Option<i64>, expected_secs: u64) {
    let now = Utc::now();
    let report = CycleReport::Refreshed {
        next_due: due_in_secs.map(|s| now + TimeDelta::seconds(s)),
        persistence: None,
    };
    assert_eq!(next_delay(&settings(), &report, now), Duration::from_secs(expected_secs));
}

#[test]
fn delay_is_floored_at_one_second() {
    let now = Utc::now();
    let report = CycleReport::Skipped {
        reason: "token not yet due".to_owned(),
        next_due: Some(now + TimeDelta::milliseconds(200)),
    };
    assert_eq!(next_delay(&settings(), &report, now), Duration::from_secs(1));
}

#[test]
fn delay_after_failures() {
    let now = Utc::now();
    assert_eq!(next_delay(&settings(), &network_failure(), now), Duration::from_secs(60));
    let fatal = CycleReport::Failed { retryable: false, message: "missing config".to_owned() };
    assert_eq!(next_delay(&settings(), &fatal, now), Duration::from_secs(100));
}
