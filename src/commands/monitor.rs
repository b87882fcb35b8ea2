//! Monitor command handler.
//!
//! Resolves the configuration (file, then command-line overrides) and runs
//! the live dashboard.

use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use std::path::PathBuf;

use crate::config::Config;
use crate::core::SourceId;
use crate::error::XtopError;
use crate::ui::monitor_tui::run_dashboard;

/// Execute the monitor command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let config = resolve_config(matches)?;

    let log_path = config.log_file.clone().or_else(Config::default_log_path);
    if let Err(e) = crate::init_logging(log_path.as_deref()) {
        // Logging is best effort; the dashboard still runs without it
        eprintln!("{} could not open log file: {}", "Warning:".yellow(), e);
    }
    log::info!(
        "Starting xtop {} with sources: {}",
        env!("CARGO_PKG_VERSION"),
        config
            .sources
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );

    run_dashboard(config).context("Failed to run dashboard")
}

/// Load the configuration file and apply command-line overrides.
pub fn resolve_config(matches: &ArgMatches) -> Result<Config, XtopError> {
    let config_path = matches.get_one::<PathBuf>("config");
    let mut config = Config::load(config_path.map(PathBuf::as_path))?;
    apply_overrides(&mut config, matches);
    config.validate()?;
    Ok(config)
}

pub fn apply_overrides(config: &mut Config, matches: &ArgMatches) {
    if let Some(&interval) = matches.get_one::<u64>("interval") {
        config.interval_ms = Some(interval);
        config.source_intervals_ms.clear();
    }
    if let Some(sources) = matches.get_one::<Vec<SourceId>>("sources") {
        config.sources = sources.clone();
    }
    if matches.get_flag("no-color") {
        config.color = false;
    }
    if let Some(&ms) = matches.get_one::<u64>("frame-interval") {
        config.frame_interval_ms = ms;
    }
    if let Some(&ms) = matches.get_one::<u64>("timeout") {
        config.fetch_timeout_ms = ms;
    }
    if let Some(&size) = matches.get_one::<usize>("history") {
        config.history_size = size;
    }
    if let Some(&top) = matches.get_one::<usize>("top") {
        config.top_processes = top;
    }
    if let Some(path) = matches.get_one::<PathBuf>("docker-socket") {
        config.docker_socket = Some(path.clone());
    }
    if let Some(url) = matches.get_one::<String>("fps-url") {
        config.fps_url = Some(url.clone());
    }
    if let Some(path) = matches.get_one::<PathBuf>("fps-file") {
        config.fps_file = Some(path.clone());
    }
    if let Some(path) = matches.get_one::<PathBuf>("log-file") {
        config.log_file = Some(path.clone());
    }
}
