//! Metric source adapters.
//!
//! Every adapter implements [`MetricSource`]; the scheduler runs each one in
//! its own task and bounds every `fetch` with a timeout.

pub mod docker;
pub mod fps;
pub mod os;
pub mod process;

use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::core::{Scheduler, Snapshot, SourceId};
use crate::error::FetchError;

pub use docker::DockerSource;
pub use fps::{FpsFeed, FpsSource, FrameCounter};
pub use os::{CpuSource, DiskSource, MemorySource, NetworkSource};
pub use process::ProcessSource;

/// Uniform snapshot-fetch contract shared by all adapters.
pub trait MetricSource: Send + 'static {
    fn id(&self) -> SourceId;

    fn default_interval(&self) -> Duration {
        self.id().default_interval()
    }

    /// Produce one snapshot. Failures are values, never panics.
    fn fetch(&mut self) -> impl Future<Output = Result<Snapshot, FetchError>> + Send;
}

/// Run blocking collector code (sysinfo refreshes) on tokio's blocking pool.
pub(crate) async fn run_blocking<T, F>(source: SourceId, f: F) -> Result<T, FetchError>
where
    F: FnOnce() -> Result<T, FetchError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        FetchError::not_available(format!("{} collector task failed: {}", source, e))
    })?
}

/// Spawn one sampling task per source enabled in the configuration.
pub fn spawn_configured(scheduler: &mut Scheduler, config: &Config) {
    for &id in &config.sources {
        let interval = Some(config.interval_for(id));
        match id {
            SourceId::Cpu => scheduler.spawn(CpuSource::new(), interval),
            SourceId::Memory => scheduler.spawn(MemorySource::new(), interval),
            SourceId::Disk => scheduler.spawn(DiskSource::new(), interval),
            SourceId::Network => scheduler.spawn(NetworkSource::new(), interval),
            SourceId::Process => scheduler.spawn(ProcessSource::new(config.top_processes), interval),
            SourceId::Docker => {
                scheduler.spawn(DockerSource::new(config.docker_socket_path()), interval)
            }
            SourceId::Fps => scheduler.spawn(
                FpsSource::with_history_size(config.fps_feed(), config.history_size),
                interval,
            ),
        }
    }
}
