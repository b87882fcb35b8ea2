use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use xtop::core::{Lifecycle, RunState, StateStore};
use xtop::ui::monitor_tui::{DashboardEvent, DashboardView, FrameSink, HostInfo, RenderEngine, SortKey, Theme, UiState};

fn host() -> HostInfo {
    HostInfo {
        hostname: "test-host".into(),
        os: "Linux".into(),
        cpu_brand: "Test CPU".into(),
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    started: Instant,
    finished: Instant,
    state: RunState,
    ui: UiState,
}

/// Records every frame; optionally stalls or fails chosen frames.
#[derive(Clone, Default)]
struct RecordingSink {
    frames: Arc<Mutex<Vec<Frame>>>,
    slow_frame: Option<(usize, Duration)>,
    failing_frame: Option<usize>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    fn frames(&self) -> Vec<Frame> {
        self.frames.lock().unwrap().clone()
    }
}

impl FrameSink for RecordingSink {
    fn draw(&mut self, view: &DashboardView) -> anyhow::Result<()> {
        let started = Instant::now();
        let index = self.count();
        if let Some((slow, stall)) = self.slow_frame {
            if index == slow {
                std::thread::sleep(stall);
            }
        }
        self.frames.lock().unwrap().push(Frame {
            started,
            finished: Instant::now(),
            state: view.state,
            ui: view.ui,
        });
        if self.failing_frame == Some(index) {
            anyhow::bail!("terminal went away");
        }
        Ok(())
    }
}

fn engine(
    sink: RecordingSink,
    lifecycle: &Arc<Lifecycle>,
    frame_interval: Duration,
) -> RenderEngine<RecordingSink> {
    RenderEngine::new(
        sink,
        StateStore::new(),
        Arc::clone(lifecycle),
        host(),
        Theme::new(true),
        frame_interval,
    )
}

#[tokio::test(start_paused = true)]
async fn test_frames_follow_interval() {
    let lifecycle = Lifecycle::new();
    let sink = RecordingSink::default();
    let (_tx, rx) = mpsc::channel(8);

    lifecycle.start();
    let handle = tokio::spawn(engine(sink.clone(), &lifecycle, Duration::from_millis(250)).run(rx));
    tokio::time::sleep(Duration::from_millis(1100)).await;
    lifecycle.shutdown();
    let (_, stats) = handle.await.unwrap();

    // 0, 250, 500, 750, 1000
    assert_eq!(sink.count(), 5);
    assert_eq!(stats.frames_drawn, 5);
    assert_eq!(stats.frames_skipped, 0);
}

#[tokio::test(start_paused = true)]
async fn test_paused_dashboard_draws_one_frame() {
    let lifecycle = Lifecycle::new();
    let sink = RecordingSink::default();
    let (_tx, rx) = mpsc::channel(8);

    lifecycle.start();
    let handle = tokio::spawn(engine(sink.clone(), &lifecycle, Duration::from_millis(100)).run(rx));
    tokio::time::sleep(Duration::from_millis(450)).await;

    assert!(lifecycle.pause());
    // The paused frame lands on the next tick
    tokio::time::sleep(Duration::from_millis(100)).await;
    let frozen = sink.count();
    assert_eq!(frozen, 6);
    assert_eq!(sink.frames().last().unwrap().state, RunState::Paused);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(sink.count(), frozen);

    assert!(lifecycle.resume());
    tokio::time::sleep(Duration::from_millis(250)).await;
    let resumed: Vec<_> = sink.frames()[frozen..].to_vec();
    // Immediate frame on resume, then the regular cadence; no replay of the pause
    assert_eq!(resumed.len(), 3);
    assert!(resumed.iter().all(|f| f.state == RunState::Running));

    lifecycle.shutdown();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_input_events_update_ui_state() {
    let lifecycle = Lifecycle::new();
    let sink = RecordingSink::default();
    let (tx, rx) = mpsc::channel(8);

    lifecycle.start();
    let handle = tokio::spawn(engine(sink.clone(), &lifecycle, Duration::from_millis(250)).run(rx));
    tokio::time::sleep(Duration::from_millis(10)).await;

    tx.send(DashboardEvent::CycleSort).await.unwrap();
    tx.send(DashboardEvent::ReverseSort).await.unwrap();
    tx.send(DashboardEvent::ToggleHelp).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    // Input alone draws nothing; the change shows on the next tick
    assert_eq!(sink.count(), 1);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(sink.count(), 2);
    let last = sink.frames().last().copied().unwrap();
    assert_eq!(last.ui.sort_key, SortKey::Memory);
    assert!(last.ui.reverse);
    assert!(last.ui.show_help);

    tx.send(DashboardEvent::TogglePause).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(lifecycle.state(), RunState::Paused);
    assert_eq!(sink.frames().last().unwrap().state, RunState::Paused);

    // Interface changes still redraw while paused
    let before = sink.count();
    tx.send(DashboardEvent::ToggleHelp).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(sink.count(), before + 1);
    assert!(!sink.frames().last().unwrap().ui.show_help);

    tx.send(DashboardEvent::Quit).await.unwrap();
    let (_, stats) = handle.await.unwrap();
    assert_eq!(lifecycle.state(), RunState::ShuttingDown);
    assert_eq!(stats.frames_drawn as usize, sink.count());
}

/// Frames started within `window` of the first one
fn frames_within(frames: &[Frame], window: Duration) -> usize {
    let first = frames[0].started;
    frames.iter().filter(|f| f.started.duration_since(first) < window).count()
}

#[tokio::test]
async fn test_event_flood_stays_within_frame_budget() {
    let lifecycle = Lifecycle::new();
    let sink = RecordingSink::default();
    let (tx, rx) = mpsc::channel(64);

    lifecycle.start();
    let handle = tokio::spawn(engine(sink.clone(), &lifecycle, Duration::from_millis(250)).run(rx));
    for _ in 0..20 {
        tx.send(DashboardEvent::Resize).await.unwrap();
        tokio::time::sleep(Duration::from_millis(45)).await;
    }
    lifecycle.shutdown();
    handle.await.unwrap();

    let frames = sink.frames();
    assert!(frames_within(&frames, Duration::from_secs(1)) <= 4, "{} frames", frames.len());
    for pair in frames.windows(2) {
        assert!(pair[1].started.duration_since(pair[0].started) >= Duration::from_millis(200));
    }
}

#[tokio::test]
async fn test_pause_toggling_stays_within_frame_budget() {
    let lifecycle = Lifecycle::new();
    let sink = RecordingSink::default();
    let (tx, rx) = mpsc::channel(64);

    lifecycle.start();
    let handle = tokio::spawn(engine(sink.clone(), &lifecycle, Duration::from_millis(250)).run(rx));
    for i in 0..20 {
        let event = if i % 3 == 0 {
            DashboardEvent::TogglePause
        } else {
            DashboardEvent::ToggleHelp
        };
        tx.send(event).await.unwrap();
        tokio::time::sleep(Duration::from_millis(45)).await;
    }
    lifecycle.shutdown();
    handle.await.unwrap();

    let frames = sink.frames();
    assert!(frames_within(&frames, Duration::from_secs(1)) <= 4, "{} frames", frames.len());
}

#[tokio::test(start_paused = true)]
async fn test_render_failure_skips_frame_only() {
    let lifecycle = Lifecycle::new();
    let sink = RecordingSink {
        failing_frame: Some(1),
        ..Default::default()
    };
    let (_tx, rx) = mpsc::channel(8);

    lifecycle.start();
    let handle = tokio::spawn(engine(sink.clone(), &lifecycle, Duration::from_millis(100)).run(rx));
    tokio::time::sleep(Duration::from_millis(450)).await;
    lifecycle.shutdown();
    let (_, stats) = handle.await.unwrap();

    assert_eq!(stats.render_failures, 1);
    assert_eq!(stats.frames_drawn, 4);
    assert_eq!(sink.count(), 5);
}

#[tokio::test]
async fn test_slow_frame_does_not_cause_burst() {
    let lifecycle = Lifecycle::new();
    let sink = RecordingSink {
        slow_frame: Some((1, Duration::from_millis(400))),
        ..Default::default()
    };
    let (_tx, rx) = mpsc::channel(8);

    lifecycle.start();
    let handle = tokio::spawn(engine(sink.clone(), &lifecycle, Duration::from_millis(250)).run(rx));
    tokio::time::sleep(Duration::from_millis(1600)).await;
    lifecycle.shutdown();
    let (_, stats) = handle.await.unwrap();

    assert!(stats.frames_skipped >= 1);
    let frames = sink.frames();
    assert!(frames.len() >= 3);
    for pair in frames.windows(2) {
        let gap = pair[1].started.duration_since(pair[0].finished);
        assert!(gap >= Duration::from_millis(150), "frames {:?} apart", gap);
    }
}

#[test]
fn test_no_frame_after_shutdown_returns() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    let lifecycle = Lifecycle::new();
    let acknowledged = Arc::new(AtomicBool::new(false));
    let late_frames = Arc::new(Mutex::new(0usize));

    struct ShutdownSink {
        lifecycle: Arc<Lifecycle>,
        acknowledged: Arc<AtomicBool>,
        late_frames: Arc<Mutex<usize>>,
        drawn: usize,
    }

    impl FrameSink for ShutdownSink {
        fn draw(&mut self, _view: &DashboardView) -> anyhow::Result<()> {
            if self.acknowledged.load(Ordering::SeqCst) {
                *self.late_frames.lock().unwrap() += 1;
            }
            self.drawn += 1;
            if self.drawn == 3 {
                // Shutdown requested from another thread while this frame is in flight
                let lifecycle = Arc::clone(&self.lifecycle);
                let acknowledged = Arc::clone(&self.acknowledged);
                std::thread::spawn(move || {
                    lifecycle.shutdown();
                    acknowledged.store(true, Ordering::SeqCst);
                });
                std::thread::sleep(Duration::from_millis(50));
            }
            Ok(())
        }
    }

    let sink = ShutdownSink {
        lifecycle: Arc::clone(&lifecycle),
        acknowledged: Arc::clone(&acknowledged),
        late_frames: Arc::clone(&late_frames),
        drawn: 0,
    };

    let sink = runtime.block_on(async {
        let (_tx, rx) = mpsc::channel(8);
        let engine = RenderEngine::new(
            sink,
            StateStore::new(),
            Arc::clone(&lifecycle),
            host(),
            Theme::new(true),
            Duration::from_millis(10),
        );
        lifecycle.start();
        let (sink, _) = engine.run(rx).await;
        sink
    });

    assert!(acknowledged.load(Ordering::SeqCst));
    assert!(sink.drawn >= 3);
    assert_eq!(*late_frames.lock().unwrap(), 0);
}
