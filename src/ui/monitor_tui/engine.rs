//! Render loop.
//!
//! Draws at a fixed frame interval, independent of sampling. A frame that
//! overruns the interval makes the loop drop the overdue tick instead of
//! drawing a catch-up burst. Input is applied between frames and shows up on
//! the next tick, so no burst of events can exceed the frame budget.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ratatui::{backend::Backend, Terminal};
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};

use super::event_handler::DashboardEvent;
use super::render::render_dashboard;
use super::view::{DashboardView, HostInfo, Theme, UiState};
use crate::core::{Lifecycle, RunState, StateStore};
use crate::error::XtopError;

/// Destination of rendered frames
pub trait FrameSink {
    fn draw(&mut self, view: &DashboardView) -> Result<()>;
}

/// Draws frames on a ratatui terminal
pub struct TerminalSink<B: Backend> {
    terminal: Terminal<B>,
}

impl<B: Backend> TerminalSink<B> {
    pub fn new(terminal: Terminal<B>) -> Self {
        Self { terminal }
    }

    pub fn terminal(&self) -> &Terminal<B> {
        &self.terminal
    }
}

impl<B: Backend> FrameSink for TerminalSink<B> {
    fn draw(&mut self, view: &DashboardView) -> Result<()> {
        self.terminal
            .draw(|frame| render_dashboard(frame, view))
            .map(|_| ())
            .map_err(|e| XtopError::render(format!("Failed to draw frame: {}", e)).into())
    }
}

/// Frame counters reported when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames_drawn: u64,
    pub frames_skipped: u64,
    pub render_failures: u64,
}

pub struct RenderEngine<S: FrameSink> {
    sink: S,
    store: StateStore,
    lifecycle: Arc<Lifecycle>,
    host: HostInfo,
    theme: Theme,
    ui: UiState,
    frame_interval: Duration,
    process_rows: usize,
    stats: RenderStats,
}

/// Process rows shown when the configuration does not say otherwise
pub const DEFAULT_PROCESS_ROWS: usize = 20;

impl<S: FrameSink> RenderEngine<S> {
    pub fn new(
        sink: S,
        store: StateStore,
        lifecycle: Arc<Lifecycle>,
        host: HostInfo,
        theme: Theme,
        frame_interval: Duration,
    ) -> Self {
        Self {
            sink,
            store,
            lifecycle,
            host,
            theme,
            ui: UiState::default(),
            frame_interval: frame_interval.max(Duration::from_millis(1)),
            process_rows: DEFAULT_PROCESS_ROWS,
            stats: RenderStats::default(),
        }
    }

    pub fn with_process_rows(mut self, rows: usize) -> Self {
        self.process_rows = rows.max(1);
        self
    }

    /// Run until the lifecycle terminates. Returns the sink and frame counters.
    ///
    /// Every frame is drawn on a tick. While running each tick draws; while
    /// paused a tick draws only when something changed (the pause itself, or
    /// an interface event).
    pub async fn run(mut self, mut events: mpsc::Receiver<DashboardEvent>) -> (S, RenderStats) {
        let mut state_rx = self.lifecycle.subscribe();
        let mut ticker = interval(self.frame_interval);
        // Ticks are never closer than one interval; overruns reset the cadence
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut input_open = true;
        let mut dirty = false;
        let mut previous = RunState::Starting;

        loop {
            let state = *state_rx.borrow_and_update();
            if state.is_terminating() {
                break;
            }
            if state == RunState::Paused && previous != RunState::Paused {
                dirty = true;
            }
            previous = state;

            match state {
                RunState::Running | RunState::Paused => {
                    let running = state == RunState::Running;
                    tokio::select! {
                        changed = state_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        event = events.recv(), if input_open => match event {
                            Some(event) => {
                                if self.handle_event(event) {
                                    dirty = true;
                                }
                            }
                            None => input_open = false,
                        },
                        _ = ticker.tick(), if running || dirty => {
                            self.draw_on_tick(&mut ticker);
                            dirty = false;
                        }
                    }
                }
                _ => {
                    if state_rx.changed().await.is_err() {
                        break;
                    }
                }
            }
        }

        log::info!(
            "Render loop stopped: {} frames drawn, {} skipped, {} failed",
            self.stats.frames_drawn,
            self.stats.frames_skipped,
            self.stats.render_failures
        );
        (self.sink, self.stats)
    }

    /// Draw one scheduled frame. An overrun drops the overdue ticks and
    /// restarts the cadence from now.
    fn draw_on_tick(&mut self, ticker: &mut Interval) {
        let elapsed = self.draw_frame();
        if elapsed >= self.frame_interval {
            let missed = elapsed.as_nanos() / self.frame_interval.as_nanos();
            self.stats.frames_skipped += missed as u64;
            ticker.reset();
        }
    }

    /// Apply one input event. Returns true when the screen content changed.
    fn handle_event(&mut self, event: DashboardEvent) -> bool {
        match event {
            DashboardEvent::Quit => {
                self.lifecycle.shutdown();
                false
            }
            DashboardEvent::TogglePause => {
                let state = self.lifecycle.toggle_pause();
                log::info!("Dashboard {}", state.label());
                false
            }
            DashboardEvent::CycleSort => {
                self.ui.sort_key = self.ui.sort_key.next();
                true
            }
            DashboardEvent::ReverseSort => {
                self.ui.reverse = !self.ui.reverse;
                true
            }
            DashboardEvent::ToggleHelp => {
                self.ui.show_help = !self.ui.show_help;
                true
            }
            DashboardEvent::Resize => true,
        }
    }

    /// Build and flush one frame. Returns how long it took.
    fn draw_frame(&mut self) -> Duration {
        let started = Instant::now();

        // Nothing reaches the terminal once shutdown is acknowledged
        let Some(_frame) = self.lifecycle.frame_guard() else {
            return Duration::ZERO;
        };
        let state = self.lifecycle.state();

        let view = DashboardView::build(
            &self.store,
            &self.host,
            self.ui,
            state,
            self.theme,
            self.process_rows,
        );
        match self.sink.draw(&view) {
            Ok(()) => self.stats.frames_drawn += 1,
            Err(e) => {
                self.stats.render_failures += 1;
                log::error!("Frame skipped: {:#}", e);
            }
        }
        started.elapsed()
    }
}
