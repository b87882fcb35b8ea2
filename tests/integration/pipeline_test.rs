use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use xtop::core::{Lifecycle, RunState, Scheduler, Snapshot, SourceHealth, SourceId, StateStore};
use xtop::sources::MetricSource;
use xtop::FetchError;

/// Emits an increasing sequence number; fails while `failing` is set.
struct CounterSource {
    id: SourceId,
    next: u64,
    failing: Arc<AtomicU64>,
}

impl CounterSource {
    fn new(id: SourceId) -> Self {
        Self {
            id,
            next: 0,
            failing: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl MetricSource for CounterSource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn fetch(&mut self) -> Result<Snapshot, FetchError> {
        if self.failing.load(Ordering::SeqCst) > 0 {
            return Err(FetchError::Timeout(Duration::from_millis(1)));
        }
        self.next += 1;
        Ok(Snapshot::new(self.id).with("seq", self.next as f64))
    }
}

#[tokio::test(start_paused = true)]
async fn test_history_stays_bounded_and_ordered() {
    let store = StateStore::with_capacity(5);
    let lifecycle = Lifecycle::new();
    let mut scheduler = Scheduler::new(store.clone(), Arc::clone(&lifecycle), Duration::from_secs(1));
    scheduler.spawn(CounterSource::new(SourceId::Cpu), Some(Duration::from_millis(100)));
    scheduler.spawn(CounterSource::new(SourceId::Fps), Some(Duration::from_millis(300)));

    lifecycle.start();
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        for id in [SourceId::Cpu, SourceId::Fps] {
            assert!(store.history(id).len() <= store.history_capacity());
        }
    }

    let history = store.history(SourceId::Cpu);
    assert_eq!(history.len(), 5);
    let seqs: Vec<f64> = history.iter().map(|s| s.value_or_zero("seq")).collect();
    assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1.0), "{:?}", seqs);
    assert_eq!(store.latest(SourceId::Cpu).unwrap().value("seq"), seqs.last().copied());

    lifecycle.shutdown();
    scheduler.join().await;
    assert_eq!(lifecycle.state(), RunState::ShuttingDown);
}

#[tokio::test(start_paused = true)]
async fn test_pause_freezes_store_and_resume_restarts() {
    let store = StateStore::new();
    let lifecycle = Lifecycle::new();
    let mut scheduler = Scheduler::new(store.clone(), Arc::clone(&lifecycle), Duration::from_secs(1));
    scheduler.spawn(CounterSource::new(SourceId::Memory), Some(Duration::from_millis(250)));

    lifecycle.start();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(lifecycle.pause());
    let frozen = store.write_count();
    assert!(frozen > 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(store.write_count(), frozen);

    assert!(lifecycle.resume());
    tokio::time::sleep(Duration::from_millis(600)).await;
    let resumed = store.write_count() - frozen;
    // A burst replaying the 20 missed ticks would show up here
    assert!((1..=4).contains(&resumed), "{} writes after resume", resumed);

    lifecycle.shutdown();
    scheduler.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_failures_mark_stale_and_recovery_clears() {
    let store = StateStore::new();
    let lifecycle = Lifecycle::new();
    let source = CounterSource::new(SourceId::Disk);
    let failing = Arc::clone(&source.failing);
    failing.store(1, Ordering::SeqCst);

    let mut scheduler = Scheduler::new(store.clone(), Arc::clone(&lifecycle), Duration::from_secs(1));
    scheduler.spawn(source, Some(Duration::from_millis(100)));
    lifecycle.start();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.status(SourceId::Disk).health(), SourceHealth::Degraded);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.status(SourceId::Disk).health(), SourceHealth::Stale);

    failing.store(0, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = store.status(SourceId::Disk);
    assert_eq!(status.health(), SourceHealth::Healthy);
    assert_eq!(status.consecutive_failures, 0);

    lifecycle.shutdown();
    scheduler.join().await;
}
