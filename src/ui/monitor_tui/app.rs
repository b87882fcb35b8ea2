use std::io::{self, IsTerminal, Stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    cursor::{Hide, Show},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;

use super::engine::{RenderEngine, TerminalSink};
use super::event_handler::spawn_input_thread;
use super::view::{HostInfo, Theme};
use crate::config::Config;
use crate::core::{Lifecycle, Scheduler, StateStore};
use crate::error::XtopError;
use crate::sources::spawn_configured;

const INPUT_QUEUE: usize = 64;
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Raw mode and alternate screen, restored on drop (also on error paths)
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        let guard = TerminalGuard;
        enable_raw_mode().context("Failed to enable raw mode")?;
        execute!(io::stdout(), EnterAlternateScreen, Hide)
            .context("Failed to enter alternate screen")?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, Show);
    }
}

/// Run the dashboard until the user quits or a signal arrives.
pub fn run_dashboard(config: Config) -> Result<()> {
    if !io::stdout().is_terminal() {
        return Err(XtopError::fatal_startup("stdout is not a terminal").into());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("xtop-worker")
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let store = StateStore::with_capacity(config.history_size);
    let lifecycle = Lifecycle::new();

    let signal_lifecycle = Arc::clone(&lifecycle);
    ctrlc::set_handler(move || {
        signal_lifecycle.shutdown();
    })
    .context("Failed to install signal handler")?;

    let host = HostInfo::detect();

    let guard = TerminalGuard::enter()?;
    let terminal: Terminal<CrosstermBackend<Stdout>> =
        Terminal::new(CrosstermBackend::new(io::stdout())).context("Failed to create terminal")?;
    let sink = TerminalSink::new(terminal);

    let (events_tx, events_rx) = mpsc::channel(INPUT_QUEUE);
    let stop_input = Arc::new(AtomicBool::new(false));
    let input = spawn_input_thread(events_tx, Arc::clone(&stop_input))
        .context("Failed to start input thread")?;

    let stats = runtime.block_on(async {
        let mut scheduler = Scheduler::new(store.clone(), Arc::clone(&lifecycle), config.fetch_timeout());
        spawn_configured(&mut scheduler, &config);
        log::info!("Sampling {} sources", scheduler.sources().len());

        let engine = RenderEngine::new(
            sink,
            store.clone(),
            Arc::clone(&lifecycle),
            host,
            Theme::new(config.color),
            config.frame_interval(),
        )
        .with_process_rows(config.top_processes);

        lifecycle.start();
        let (_sink, stats) = engine.run(events_rx).await;

        lifecycle.shutdown();
        scheduler.join().await;
        lifecycle.mark_stopped();
        stats
    });

    stop_input.store(true, Ordering::Relaxed);
    if input.join().is_err() {
        log::error!("Input thread panicked");
    }
    drop(guard);

    // Blocking collectors still in flight are abandoned, not awaited
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    log::info!(
        "xtop stopped after {} frames ({} store writes)",
        stats.frames_drawn,
        store.write_count()
    );
    Ok(())
}
