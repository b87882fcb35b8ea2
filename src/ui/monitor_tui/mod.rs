//! Terminal User Interface for the live dashboard.
//!
//! Provides a real-time dashboard using ratatui.

mod app;
mod engine;
mod event_handler;
mod render;
mod view;
mod widgets;

pub use app::run_dashboard;
pub use engine::{FrameSink, RenderEngine, RenderStats, TerminalSink, DEFAULT_PROCESS_ROWS};
pub use event_handler::{map_key, spawn_input_thread, DashboardEvent};
pub use render::render_dashboard;
pub use view::{sort_processes, DashboardView, HostInfo, PanelView, SortKey, Theme, UiState};
