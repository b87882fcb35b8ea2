//! Process-wide run state: `Starting → Running ⇄ Paused → ShuttingDown → Stopped`.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Starting,
    Running,
    Paused,
    ShuttingDown,
    Stopped,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Starting, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Starting, ShuttingDown)
                | (Running, ShuttingDown)
                | (Paused, ShuttingDown)
                | (ShuttingDown, Stopped)
        )
    }

    /// Tasks must exit once this is true
    pub fn is_terminating(self) -> bool {
        matches!(self, RunState::ShuttingDown | RunState::Stopped)
    }

    pub fn label(self) -> &'static str {
        match self {
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::ShuttingDown => "shutting down",
            RunState::Stopped => "stopped",
        }
    }
}

/// Shared handle to the run state.
///
/// Besides broadcasting state changes, it owns the write gate: snapshot
/// writes happen under a read guard, `pause` and `shutdown` take the write
/// side, so once either returns no further write can land.
pub struct Lifecycle {
    state: watch::Sender<RunState>,
    gate: RwLock<()>,
}

impl Lifecycle {
    pub fn new() -> Arc<Self> {
        let (state, _) = watch::channel(RunState::Starting);
        Arc::new(Self {
            state,
            gate: RwLock::new(()),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    fn transition(&self, next: RunState) -> bool {
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                log::debug!("run state {} -> {}", current.label(), next.label());
                *current = next;
                true
            } else {
                false
            }
        })
    }

    pub fn start(&self) -> bool {
        self.transition(RunState::Running)
    }

    pub fn pause(&self) -> bool {
        let _gate = self.gate.write();
        self.transition(RunState::Paused)
    }

    pub fn resume(&self) -> bool {
        self.transition(RunState::Running)
    }

    pub fn toggle_pause(&self) -> RunState {
        match self.state() {
            RunState::Running => {
                self.pause();
            }
            RunState::Paused => {
                self.resume();
            }
            _ => {}
        }
        self.state()
    }

    pub fn shutdown(&self) -> bool {
        let _gate = self.gate.write();
        self.transition(RunState::ShuttingDown)
    }

    pub fn mark_stopped(&self) -> bool {
        self.transition(RunState::Stopped)
    }

    /// Permission to publish results; `None` unless the process is running.
    pub fn write_guard(&self) -> Option<RwLockReadGuard<'_, ()>> {
        let guard = self.gate.read();
        if self.state() == RunState::Running {
            Some(guard)
        } else {
            None
        }
    }

    /// Permission to flush a frame; `None` once shutdown has begun.
    ///
    /// `shutdown` waits for an in-flight frame, so after it returns nothing
    /// more reaches the terminal.
    pub fn frame_guard(&self) -> Option<RwLockReadGuard<'_, ()>> {
        let guard = self.gate.read();
        if self.state().is_terminating() {
            None
        } else {
            Some(guard)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), RunState::Starting);
        assert!(!lifecycle.pause());
        assert!(lifecycle.start());
        assert_eq!(lifecycle.toggle_pause(), RunState::Paused);
        assert_eq!(lifecycle.toggle_pause(), RunState::Running);
        assert!(lifecycle.shutdown());
        assert!(!lifecycle.resume());
        assert!(lifecycle.mark_stopped());
        assert_eq!(lifecycle.state(), RunState::Stopped);
    }

    #[test]
    fn test_stopped_requires_shutting_down() {
        let lifecycle = Lifecycle::new();
        lifecycle.start();
        assert!(!lifecycle.mark_stopped());
        assert_eq!(lifecycle.state(), RunState::Running);
    }

    #[test]
    fn test_write_guard_only_while_running() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.write_guard().is_none());
        lifecycle.start();
        assert!(lifecycle.write_guard().is_some());
        lifecycle.pause();
        assert!(lifecycle.write_guard().is_none());
        lifecycle.resume();
        assert!(lifecycle.write_guard().is_some());
        lifecycle.shutdown();
        assert!(lifecycle.write_guard().is_none());
    }

    #[test]
    fn test_frame_guard_until_shutdown() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.frame_guard().is_some());
        lifecycle.start();
        lifecycle.pause();
        assert!(lifecycle.frame_guard().is_some());
        lifecycle.shutdown();
        assert!(lifecycle.frame_guard().is_none());
    }

    #[test]
    fn test_subscribers_see_changes() {
        let lifecycle = Lifecycle::new();
        let mut rx = lifecycle.subscribe();
        lifecycle.start();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), RunState::Running);
    }
}
