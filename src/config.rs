use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{SourceId, DEFAULT_HISTORY_SIZE, MAX_HISTORY_SIZE};
use crate::error::{Result, XtopError};
use crate::sources::docker::DEFAULT_DOCKER_SOCKET;
use crate::sources::FpsFeed;

/// Runtime configuration. Every field has a default; the JSON file and the
/// command line only override what they mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Poll interval applied to every source without its own override
    pub interval_ms: Option<u64>,
    /// Per-source poll intervals
    pub source_intervals_ms: BTreeMap<SourceId, u64>,
    pub frame_interval_ms: u64,
    pub fetch_timeout_ms: u64,
    pub history_size: usize,
    pub sources: Vec<SourceId>,
    pub color: bool,
    pub top_processes: usize,
    pub docker_socket: Option<PathBuf>,
    pub fps_url: Option<String>,
    pub fps_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_ms: None,
            source_intervals_ms: BTreeMap::new(),
            frame_interval_ms: 250,
            fetch_timeout_ms: 2000,
            history_size: DEFAULT_HISTORY_SIZE,
            sources: SourceId::ALL.to_vec(),
            color: true,
            top_processes: 20,
            docker_socket: None,
            fps_url: None,
            fps_file: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Load the configuration.
    ///
    /// An explicit path must exist; the default location is optional and
    /// falls back to built-in defaults when absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Config::default()),
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            XtopError::config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        if data.trim().is_empty() {
            return Ok(Config::default());
        }

        serde_json::from_str(&data)
            .map_err(|e| XtopError::config(format!("Invalid config file {:?}: {}", path, e)))
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("xtop").join("config.json"))
    }

    pub fn default_log_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("xtop").join("xtop.log"))
    }

    /// Reject values that would stall a timer or size a ring to nothing.
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == Some(0) {
            return Err(XtopError::config("interval must be greater than 0ms"));
        }
        if let Some((id, _)) = self.source_intervals_ms.iter().find(|(_, ms)| **ms == 0) {
            return Err(XtopError::config(format!(
                "interval for source '{}' must be greater than 0ms",
                id
            )));
        }
        if self.frame_interval_ms == 0 {
            return Err(XtopError::config("frame interval must be greater than 0ms"));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(XtopError::config("fetch timeout must be greater than 0ms"));
        }
        if self.history_size == 0 {
            return Err(XtopError::config("history size must be at least 1"));
        }
        if self.history_size > MAX_HISTORY_SIZE {
            return Err(XtopError::config(format!(
                "history size must be at most {}",
                MAX_HISTORY_SIZE
            )));
        }
        if self.top_processes == 0 {
            return Err(XtopError::config("process row count must be at least 1"));
        }
        if self.sources.is_empty() {
            return Err(XtopError::config("at least one source must be enabled"));
        }
        Ok(())
    }

    /// Per-source override, then the global interval, then the source default.
    pub fn interval_for(&self, id: SourceId) -> Duration {
        self.source_intervals_ms
            .get(&id)
            .copied()
            .or(self.interval_ms)
            .map(Duration::from_millis)
            .unwrap_or_else(|| id.default_interval())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn docker_socket_path(&self) -> PathBuf {
        self.docker_socket.clone().unwrap_or_else(|| {
            docker_socket_from_host(std::env::var("DOCKER_HOST").ok().as_deref())
        })
    }

    /// The HTTP feed wins when both feeds are configured.
    pub fn fps_feed(&self) -> Option<FpsFeed> {
        if let Some(url) = &self.fps_url {
            return Some(FpsFeed::Http(url.clone()));
        }
        self.fps_file.clone().map(FpsFeed::File)
    }
}

/// Socket path from a `DOCKER_HOST` value; only `unix://` hosts are honoured.
pub fn docker_socket_from_host(host: Option<&str>) -> PathBuf {
    host.and_then(|h| h.strip_prefix("unix://"))
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCKER_SOCKET))
}
