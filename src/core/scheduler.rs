//! Sampler/scheduler: one independent task per metric source.
//!
//! Each task owns its adapter and its `SourceDescriptor`. Fetches for a
//! single source are serialized (the next tick is only awaited after the
//! previous fetch settled), so snapshots reach the history ring in fetch
//! order; concurrency only exists across sources.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};

use super::lifecycle::{Lifecycle, RunState};
use super::snapshot::SourceId;
use super::store::{SourceHealth, SourceStatus, StateStore, STALE_AFTER_FAILURES};
use crate::error::FetchError;
use crate::sources::MetricSource;

/// Floor for the retry cadence of a source whose dependency is missing
const UNAVAILABLE_RETRY_FLOOR: Duration = Duration::from_secs(10);
const UNAVAILABLE_RETRY_FACTOR: u32 = 10;

/// Scheduling record of one source. Owned and mutated by its task only.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub id: SourceId,
    pub interval: Duration,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<FetchError>,
    pub enabled: bool,
    consecutive_failures: u32,
    permission_flagged: bool,
}

impl SourceDescriptor {
    pub fn new(id: SourceId, interval: Duration) -> Self {
        Self {
            id,
            interval,
            last_success: None,
            last_error: None,
            enabled: true,
            consecutive_failures: 0,
            permission_flagged: false,
        }
    }

    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.last_success = Some(at);
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self, err: FetchError) {
        if matches!(err, FetchError::PermissionDenied(_)) {
            self.permission_flagged = true;
        }
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(err);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn status(&self) -> SourceStatus {
        SourceStatus {
            source: self.id,
            enabled: self.enabled,
            interval: self.interval,
            last_success: self.last_success,
            last_error: self.last_error.clone(),
            consecutive_failures: self.consecutive_failures,
            permission_flagged: self.permission_flagged,
        }
    }

    /// Period until the next fetch: the configured interval, or the slow
    /// retry cadence while the dependency is missing.
    pub fn effective_interval(&self) -> Duration {
        if self.status().health() == SourceHealth::Unavailable {
            (self.interval * UNAVAILABLE_RETRY_FACTOR).max(UNAVAILABLE_RETRY_FLOOR)
        } else {
            self.interval
        }
    }
}

#[derive(Clone)]
struct TaskContext {
    store: StateStore,
    lifecycle: Arc<Lifecycle>,
    fetch_timeout: Duration,
}

/// Spawns and tracks the per-source sampling tasks.
pub struct Scheduler {
    ctx: TaskContext,
    tasks: Vec<(SourceId, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new(store: StateStore, lifecycle: Arc<Lifecycle>, fetch_timeout: Duration) -> Self {
        Self {
            ctx: TaskContext {
                store,
                lifecycle,
                fetch_timeout,
            },
            tasks: Vec::new(),
        }
    }

    /// Start sampling `source` every `interval` (its default when `None`).
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: MetricSource>(&mut self, source: S, interval: Option<Duration>) {
        let id = source.id();
        let interval = interval.unwrap_or_else(|| source.default_interval());
        let descriptor = SourceDescriptor::new(id, interval);
        let handle = tokio::spawn(run_source(source, descriptor, self.ctx.clone()));
        self.tasks.push((id, handle));
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.tasks.iter().map(|(id, _)| *id).collect()
    }

    /// Wait for every source task to exit.
    ///
    /// Tasks stop at their next check point once the lifecycle leaves
    /// `Running`/`Paused` for `ShuttingDown`.
    pub async fn join(self) {
        for (id, handle) in self.tasks {
            if let Err(e) = handle.await {
                log::error!("Source task {} ended abnormally: {}", id, e);
            }
        }
    }
}

fn ticker(period: Duration, first_tick: Instant) -> Interval {
    let mut ticker = interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Resolves to `true` once running, `false` if the process is terminating.
async fn wait_until_running(state_rx: &mut watch::Receiver<RunState>) -> bool {
    match state_rx
        .wait_for(|s| *s == RunState::Running || s.is_terminating())
        .await
    {
        Ok(state) => !state.is_terminating(),
        Err(_) => false,
    }
}

async fn wait_until_interrupted(state_rx: &mut watch::Receiver<RunState>) {
    let _ = state_rx.wait_for(|s| *s != RunState::Running).await;
}

async fn run_source<S: MetricSource>(
    mut source: S,
    mut descriptor: SourceDescriptor,
    ctx: TaskContext,
) {
    let id = descriptor.id;
    let mut state_rx = ctx.lifecycle.subscribe();
    let mut period = descriptor.interval;
    let mut timer = ticker(period, Instant::now());

    ctx.store.publish_status(descriptor.status());
    log::info!("Source {} started ({}ms interval)", id, period.as_millis());

    loop {
        let state = *state_rx.borrow_and_update();
        if state.is_terminating() {
            break;
        }
        if state != RunState::Running {
            if !wait_until_running(&mut state_rx).await {
                break;
            }
            // Resume from now, never replay ticks missed while paused
            timer = ticker(period, Instant::now());
        }

        tokio::select! {
            _ = timer.tick() => {}
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }

        let outcome = tokio::select! {
            result = timeout(ctx.fetch_timeout, source.fetch()) => {
                result.unwrap_or(Err(FetchError::Timeout(ctx.fetch_timeout)))
            }
            _ = wait_until_interrupted(&mut state_rx) => {
                log::debug!("Source {} fetch abandoned on state change", id);
                continue;
            }
        };

        match outcome {
            Ok(snapshot) => {
                let recovered = descriptor.consecutive_failures() > 0;
                descriptor.record_success(snapshot.taken_at);
                if let Some(_guard) = ctx.lifecycle.write_guard() {
                    ctx.store.write(id, snapshot);
                    ctx.store.publish_status(descriptor.status());
                }
                if recovered {
                    log::info!("Source {} recovered", id);
                }
            }
            Err(err) => {
                let failures = descriptor.consecutive_failures() + 1;
                if failures == 1 || failures == STALE_AFTER_FAILURES {
                    log::warn!("Source {} fetch failed (attempt {}): {}", id, failures, err);
                } else {
                    log::debug!("Source {} fetch failed (attempt {}): {}", id, failures, err);
                }
                descriptor.record_failure(err);
                if let Some(_guard) = ctx.lifecycle.write_guard() {
                    ctx.store.publish_status(descriptor.status());
                }
            }
        }

        let wanted = descriptor.effective_interval();
        if wanted != period {
            log::info!(
                "Source {} cadence changed {}ms -> {}ms",
                id,
                period.as_millis(),
                wanted.as_millis()
            );
            period = wanted;
            timer = ticker(period, Instant::now() + period);
        }
    }

    log::info!("Source {} stopped", id);
}
