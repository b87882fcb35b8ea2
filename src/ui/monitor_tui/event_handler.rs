use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;

const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Events that can occur in the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardEvent {
    /// Quit the application
    Quit,
    /// Pause or resume sampling and rendering
    TogglePause,
    /// Cycle the process sort key
    CycleSort,
    /// Reverse the process sort order
    ReverseSort,
    /// Toggle help overlay
    ToggleHelp,
    /// Terminal was resized
    Resize,
}

/// Map a key press to a dashboard event
pub fn map_key(key: KeyEvent) -> Option<DashboardEvent> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(DashboardEvent::Quit)
        }
        KeyCode::Char('q') | KeyCode::Esc => Some(DashboardEvent::Quit),
        KeyCode::Char('p') | KeyCode::Char(' ') => Some(DashboardEvent::TogglePause),
        KeyCode::Char('s') => Some(DashboardEvent::CycleSort),
        KeyCode::Char('r') => Some(DashboardEvent::ReverseSort),
        KeyCode::Char('?') | KeyCode::Char('h') => Some(DashboardEvent::ToggleHelp),
        _ => None,
    }
}

/// Read terminal input on a dedicated thread and forward it to the render task.
///
/// The thread exits when `stop` is set, the receiver is dropped or the
/// terminal stops delivering events.
pub fn spawn_input_thread(
    events: mpsc::Sender<DashboardEvent>,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("xtop-input".to_string())
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let ready = match event::poll(INPUT_POLL_INTERVAL) {
                    Ok(ready) => ready,
                    Err(e) => {
                        log::error!("Event poll failed: {}", e);
                        break;
                    }
                };
                if !ready {
                    continue;
                }

                let mapped = match event::read() {
                    Ok(Event::Key(key)) => map_key(key),
                    Ok(Event::Resize(_, _)) => Some(DashboardEvent::Resize),
                    Ok(_) => None,
                    Err(e) => {
                        log::error!("Event read failed: {}", e);
                        break;
                    }
                };
                if let Some(event) = mapped {
                    if events.blocking_send(event).is_err() {
                        break;
                    }
                }
            }
        })
}
