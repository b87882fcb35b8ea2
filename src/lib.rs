// xtop Library - Public API

// Re-export error types
pub mod error;
pub use error::{FetchError, Result, XtopError};

// Module declarations
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod sources;
pub mod ui;

// Re-export commonly used types
pub use config::Config;

use std::fs::{self, OpenOptions};
use std::path::Path;

/// Initialize logging.
///
/// The dashboard owns the terminal, so records go to `path` when given and
/// are dropped otherwise. `RUST_LOG` overrides the default `info` level.
pub fn init_logging(path: Option<&Path>) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis();

    match path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        None => {
            builder.filter_level(log::LevelFilter::Off);
        }
    }

    // A second initialisation (tests) keeps the first logger
    let _ = builder.try_init();
    Ok(())
}
