//! Dashboard view model.
//!
//! Rebuilt from the state store on every frame and never written back. The
//! renderer only sees this copy, so a frame is drawn from one consistent read
//! per source even while samplers keep writing.

use std::sync::Arc;

use chrono::{DateTime, Local};
use ratatui::style::{Color, Modifier, Style};
use sysinfo::System;

use crate::core::{Entity, RunState, Snapshot, SourceHealth, SourceId, SourceStatus, StateStore};
use crate::sources::CpuSource;
use crate::ui::formatters::format_snapshot_time;

pub use crate::sources::process::{sort_processes, SortKey};

/// Interactive state owned by the render task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UiState {
    pub sort_key: SortKey,
    pub reverse: bool,
    pub show_help: bool,
}

/// Static facts for the header, gathered once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    pub cpu_brand: String,
}

impl HostInfo {
    pub fn detect() -> Self {
        Self {
            hostname: System::host_name().unwrap_or_else(|| "localhost".to_string()),
            os: System::long_os_version().unwrap_or_else(|| "Unknown OS".to_string()),
            cpu_brand: CpuSource::cpu_brand(),
        }
    }
}

/// Colors, or the terminal's default style everywhere with `--no-color`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub color: bool,
}

impl Theme {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    pub fn fg(&self, color: Color) -> Style {
        if self.color {
            Style::default().fg(color)
        } else {
            Style::default()
        }
    }

    pub fn bold(&self) -> Style {
        if self.color {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        }
    }

    pub fn border(&self, panel: &PanelView) -> Style {
        self.shared_border(&[panel])
    }

    /// Border of a panel shared by several sources: stale wins over a
    /// permission flag, which wins over healthy.
    pub fn shared_border(&self, panels: &[&PanelView]) -> Style {
        if panels.iter().any(|p| p.is_stale()) {
            self.fg(Color::DarkGray)
        } else if panels.iter().any(|p| p.status.permission_flagged) {
            self.fg(Color::Yellow)
        } else {
            self.fg(Color::Cyan)
        }
    }

    /// Color for a usage percentage
    pub fn usage(&self, percent: f64) -> Style {
        let color = match percent {
            v if v < 50.0 => Color::Cyan,
            v if v < 75.0 => Color::LightYellow,
            v if v < 90.0 => Color::LightRed,
            _ => Color::Red,
        };
        self.fg(color)
    }
}

/// One source as seen by a single frame
#[derive(Debug, Clone)]
pub struct PanelView {
    pub source: SourceId,
    pub status: SourceStatus,
    pub latest: Option<Arc<Snapshot>>,
    pub history: Vec<Arc<Snapshot>>,
}

impl PanelView {
    pub fn read(store: &StateStore, source: SourceId) -> Self {
        let (latest, history, status) = store.read_source(source);
        Self {
            source,
            status,
            latest,
            history,
        }
    }

    pub fn health(&self) -> SourceHealth {
        self.status.health()
    }

    /// Disabled and unavailable sources get no panel
    pub fn is_visible(&self) -> bool {
        !matches!(self.health(), SourceHealth::Disabled | SourceHealth::Unavailable)
    }

    pub fn is_stale(&self) -> bool {
        self.status.is_stale()
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.latest.as_ref().and_then(|s| s.value(name))
    }

    pub fn entities(&self) -> &[Entity] {
        self.latest.as_ref().map(|s| s.entities.as_slice()).unwrap_or(&[])
    }

    /// Values of `name` across the history, oldest first
    pub fn series(&self, name: &str) -> Vec<f64> {
        self.history.iter().map(|s| s.value_or_zero(name)).collect()
    }

    /// " HH:MM:SS" of the latest snapshot, empty before the first one
    pub fn stamp(&self) -> String {
        self.latest
            .as_ref()
            .map(|s| format!(" {}", format_snapshot_time(s.taken_at)))
            .unwrap_or_default()
    }

    /// Panel title with snapshot time and health markers
    pub fn title(&self, base: &str) -> String {
        let mut title = format!(" {}{}", base, self.stamp());
        if self.is_stale() {
            title.push_str(" [stale]");
        }
        if self.status.permission_flagged {
            title.push_str(" [permission denied]");
        }
        title.push(' ');
        title
    }
}

/// Everything one frame needs
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub host: HostInfo,
    pub now: DateTime<Local>,
    pub state: RunState,
    pub ui: UiState,
    pub theme: Theme,
    pub panels: Vec<PanelView>,
    pub processes: Vec<Entity>,
}

impl DashboardView {
    /// `process_rows` bounds the process table after sorting.
    pub fn build(
        store: &StateStore,
        host: &HostInfo,
        ui: UiState,
        state: RunState,
        theme: Theme,
        process_rows: usize,
    ) -> Self {
        let panels: Vec<PanelView> = SourceId::ALL
            .iter()
            .map(|&id| PanelView::read(store, id))
            .collect();
        let mut processes = sort_processes(
            panels[SourceId::Process.index()].entities(),
            ui.sort_key,
            ui.reverse,
        );
        processes.truncate(process_rows);

        Self {
            host: host.clone(),
            now: Local::now(),
            state,
            ui,
            theme,
            panels,
            processes,
        }
    }

    pub fn panel(&self, id: SourceId) -> &PanelView {
        &self.panels[id.index()]
    }

    pub fn is_visible(&self, id: SourceId) -> bool {
        self.panel(id).is_visible()
    }
}
