//! Docker container statistics over the daemon's Unix control socket.
//!
//! The daemon is an untrusted, possibly absent collaborator: a missing or
//! refusing socket is reported as `NotAvailable`, which hides the panel and
//! slows retries, and `EACCES`/403 as `PermissionDenied`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures_util::future::join_all;
use serde::Deserialize;

use super::MetricSource;
use crate::core::{Entity, Snapshot, SourceId};
use crate::error::FetchError;

pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

pub const CONTAINER_COUNT: &str = "containers";
pub const TOTAL_CPU: &str = "cpu_percent_total";
pub const TOTAL_MEMORY: &str = "memory_bytes_total";

pub const CPU_PERCENT: &str = "cpu_percent";
pub const CPU_LIMIT: &str = "cpu_limit";
pub const MEM_USAGE: &str = "memory_usage";
pub const MEM_LIMIT: &str = "memory_limit";
pub const MEM_PERCENT: &str = "memory_percent";
pub const NET_RX: &str = "net_rx";
pub const NET_TX: &str = "net_tx";
pub const BLOCK_READ: &str = "block_read";
pub const BLOCK_WRITE: &str = "block_write";
pub const PIDS: &str = "pids";

/// Container list entry (from GET /containers/json)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
}

impl ContainerSummary {
    pub fn short_id(&self) -> &str {
        if self.id.len() >= 12 {
            &self.id[..12]
        } else {
            &self.id
        }
    }

    pub fn clean_name(&self) -> String {
        self.names
            .first()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| self.short_id().to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerStats {
    #[serde(default)]
    pub cpu_stats: CpuStats,
    #[serde(default)]
    pub precpu_stats: CpuStats,
    #[serde(default)]
    pub memory_stats: MemoryStats,
    #[serde(default)]
    pub networks: Option<HashMap<String, NetworkStats>>,
    #[serde(default)]
    pub blkio_stats: BlkioStats,
    #[serde(default)]
    pub pids_stats: PidsStats,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CpuStats {
    #[serde(default)]
    pub cpu_usage: CpuUsage,
    #[serde(default)]
    pub system_cpu_usage: Option<u64>,
    #[serde(default)]
    pub online_cpus: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CpuUsage {
    #[serde(default)]
    pub total_usage: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryStats {
    #[serde(default)]
    pub usage: u64,
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkStats {
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlkioStats {
    #[serde(default)]
    pub io_service_bytes_recursive: Option<Vec<BlkioEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlkioEntry {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub value: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PidsStats {
    #[serde(default)]
    pub current: Option<u64>,
}

/// Subset of GET /containers/{id}/json
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    #[serde(default)]
    pub host_config: HostConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default)]
    pub nano_cpus: i64,
    #[serde(default)]
    pub cpu_quota: i64,
    #[serde(default)]
    pub cpu_period: i64,
}

impl HostConfig {
    /// Configured CPU limit in cores, if any
    pub fn cpu_limit(&self) -> Option<f64> {
        if self.nano_cpus > 0 {
            return Some(self.nano_cpus as f64 / 1e9);
        }
        if self.cpu_quota > 0 {
            let period = if self.cpu_period > 0 { self.cpu_period } else { 100_000 };
            return Some(self.cpu_quota as f64 / period as f64);
        }
        None
    }
}

/// CPU usage in percent of one core, from two cumulative readings.
pub fn cpu_percent(current: &CpuStats, previous: &CpuStats) -> f64 {
    let cpu_delta = current
        .cpu_usage
        .total_usage
        .saturating_sub(previous.cpu_usage.total_usage);
    let system_delta = current
        .system_cpu_usage
        .unwrap_or(0)
        .saturating_sub(previous.system_cpu_usage.unwrap_or(0));
    let online_cpus = current.online_cpus.unwrap_or(1).max(1);

    if system_delta > 0 && cpu_delta > 0 {
        cpu_delta as f64 / system_delta as f64 * online_cpus as f64 * 100.0
    } else {
        0.0
    }
}

/// Resource usage of one container, ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerUsage {
    pub id: String,
    pub name: String,
    pub cpu_percent: f64,
    pub cpu_limit: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub net_rx: u64,
    pub net_tx: u64,
    pub block_read: u64,
    pub block_write: u64,
    pub pids: u64,
}

impl ContainerUsage {
    pub fn from_stats(
        summary: &ContainerSummary,
        stats: &ContainerStats,
        previous_cpu: Option<&CpuStats>,
        cpu_limit: Option<f64>,
    ) -> Self {
        // One-shot stats come with an empty precpu reading; without a sample
        // of our own the only honest rate is none
        let baseline = previous_cpu.or_else(|| {
            let primed = stats.precpu_stats.system_cpu_usage.unwrap_or(0) > 0;
            primed.then_some(&stats.precpu_stats)
        });
        let cpu = baseline.map_or(0.0, |previous| cpu_percent(&stats.cpu_stats, previous));
        let cpu_limit = cpu_limit.unwrap_or_else(|| stats.cpu_stats.online_cpus.unwrap_or(1) as f64);

        let memory_usage = stats.memory_stats.usage;
        let memory_limit = stats.memory_stats.limit;
        let memory_percent = if memory_limit > 0 {
            memory_usage as f64 / memory_limit as f64 * 100.0
        } else {
            0.0
        };

        let (net_rx, net_tx) = stats
            .networks
            .iter()
            .flat_map(|nets| nets.values())
            .fold((0, 0), |(rx, tx), n| (rx + n.rx_bytes, tx + n.tx_bytes));

        let (block_read, block_write) = stats
            .blkio_stats
            .io_service_bytes_recursive
            .iter()
            .flatten()
            .fold((0, 0), |(rd, wr), entry| {
                if entry.op.eq_ignore_ascii_case("read") {
                    (rd + entry.value, wr)
                } else if entry.op.eq_ignore_ascii_case("write") {
                    (rd, wr + entry.value)
                } else {
                    (rd, wr)
                }
            });

        Self {
            id: summary.short_id().to_string(),
            name: summary.clean_name(),
            cpu_percent: cpu,
            cpu_limit,
            memory_usage,
            memory_limit,
            memory_percent,
            net_rx,
            net_tx,
            block_read,
            block_write,
            pids: stats.pids_stats.current.unwrap_or(0),
        }
    }

    pub fn to_entity(&self) -> Entity {
        Entity::new(self.id.clone(), self.name.clone())
            .with(CPU_PERCENT, self.cpu_percent)
            .with(CPU_LIMIT, self.cpu_limit)
            .with(MEM_USAGE, self.memory_usage as f64)
            .with(MEM_LIMIT, self.memory_limit as f64)
            .with(MEM_PERCENT, self.memory_percent)
            .with(NET_RX, self.net_rx as f64)
            .with(NET_TX, self.net_tx as f64)
            .with(BLOCK_READ, self.block_read as f64)
            .with(BLOCK_WRITE, self.block_write as f64)
            .with(PIDS, self.pids as f64)
    }
}

/// Status code and decoded body of a daemon answer
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Decode a `Transfer-Encoding: chunked` body.
pub fn decode_chunked(mut body: &[u8]) -> Result<Vec<u8>, String> {
    let mut decoded = Vec::with_capacity(body.len());
    loop {
        let line_end = find_subslice(body, b"\r\n").ok_or("truncated chunk header")?;
        let header = String::from_utf8_lossy(&body[..line_end]);
        let size_field = header.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_field, 16)
            .map_err(|_| format!("invalid chunk size '{}'", size_field))?;
        body = &body[line_end + 2..];
        if size == 0 {
            return Ok(decoded);
        }
        if body.len() < size {
            return Err("truncated chunk body".to_string());
        }
        decoded.extend_from_slice(&body[..size]);
        body = body.get(size + 2..).unwrap_or(&[]);
    }
}

/// Split a raw HTTP/1.x response into status and (de-chunked) body.
pub fn parse_http_response(raw: &[u8]) -> Result<HttpResponse, FetchError> {
    let head_end = find_subslice(raw, b"\r\n\r\n")
        .ok_or_else(|| FetchError::not_available("malformed HTTP response from Docker"))?;
    let head = String::from_utf8_lossy(&raw[..head_end]);
    let mut lines = head.split("\r\n");

    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| FetchError::not_available("missing HTTP status from Docker"))?;

    let chunked = lines.any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("transfer-encoding")
                && value.trim().eq_ignore_ascii_case("chunked")
        })
    });

    let body = &raw[head_end + 4..];
    let body = if chunked {
        decode_chunked(body).map_err(|e| FetchError::not_available(format!("Docker response: {}", e)))?
    } else {
        body.to_vec()
    };

    Ok(HttpResponse { status, body })
}

/// Minimal HTTP/1.0 client for the Docker Engine API over a Unix socket.
#[derive(Debug, Clone)]
pub struct DockerClient {
    socket_path: PathBuf,
}

impl DockerClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    #[cfg(unix)]
    async fn request(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::UnixStream;

        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| FetchError::from_io("Docker socket", &e))?;

        let request = format!("GET {} HTTP/1.0\r\nHost: docker\r\n\r\n", path);
        let (mut reader, mut writer) = stream.into_split();
        writer
            .write_all(request.as_bytes())
            .await
            .map_err(|e| FetchError::from_io("Docker request", &e))?;
        writer
            .shutdown()
            .await
            .map_err(|e| FetchError::from_io("Docker request", &e))?;

        let mut raw = Vec::new();
        reader
            .read_to_end(&mut raw)
            .await
            .map_err(|e| FetchError::from_io("Docker response", &e))?;
        Ok(raw)
    }

    #[cfg(not(unix))]
    async fn request(&self, _path: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::not_available(
            "Docker over a Unix socket is not supported on this platform",
        ))
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let raw = self.request(path).await?;
        let response = parse_http_response(&raw)?;
        match response.status {
            200..=299 => serde_json::from_slice(&response.body).map_err(|e| {
                FetchError::not_available(format!("invalid Docker JSON for {}: {}", path, e))
            }),
            401 | 403 => Err(FetchError::permission_denied(format!(
                "Docker API refused {} ({})",
                path, response.status
            ))),
            status => Err(FetchError::not_available(format!(
                "Docker API returned {} for {}",
                status, path
            ))),
        }
    }

    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>, FetchError> {
        self.get_json("/containers/json").await
    }

    /// One-shot stats; CPU deltas are computed against our own previous sample.
    pub async fn container_stats(&self, id: &str) -> Result<ContainerStats, FetchError> {
        self.get_json(&format!("/containers/{}/stats?stream=false&one-shot=true", id))
            .await
    }

    pub async fn inspect(&self, id: &str) -> Result<ContainerInspect, FetchError> {
        self.get_json(&format!("/containers/{}/json", id)).await
    }
}

/// Per-container usage from the Docker daemon.
pub struct DockerSource {
    client: DockerClient,
    cpu_limits: HashMap<String, Option<f64>>,
    previous_cpu: HashMap<String, CpuStats>,
}

impl DockerSource {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            client: DockerClient::new(socket_path),
            cpu_limits: HashMap::new(),
            previous_cpu: HashMap::new(),
        }
    }

    /// Stats plus the CPU limit. The limit is `None` when it is not known
    /// yet (inspect failed); `Some(None)` means the container has no limit.
    async fn collect_one(
        client: &DockerClient,
        summary: ContainerSummary,
        cached_limit: Option<Option<f64>>,
    ) -> (ContainerSummary, Result<ContainerStats, FetchError>, Option<Option<f64>>) {
        let stats = client.container_stats(&summary.id).await;
        let limit = match cached_limit {
            Some(limit) => Some(limit),
            None => match client.inspect(&summary.id).await {
                Ok(inspect) => Some(inspect.host_config.cpu_limit()),
                Err(e) => {
                    log::debug!("Inspect of {} failed, retrying next fetch: {}", summary.short_id(), e);
                    None
                }
            },
        };
        (summary, stats, limit)
    }
}

impl MetricSource for DockerSource {
    fn id(&self) -> SourceId {
        SourceId::Docker
    }

    async fn fetch(&mut self) -> Result<Snapshot, FetchError> {
        let containers = self.client.list_containers().await?;

        let client = &self.client;
        let jobs = containers.into_iter().map(|summary| {
            let cached = self.cpu_limits.get(&summary.id).copied();
            Self::collect_one(client, summary, cached)
        });
        let results = join_all(jobs).await;

        let mut usages = Vec::with_capacity(results.len());
        let mut limits = HashMap::with_capacity(results.len());
        let mut previous = HashMap::with_capacity(results.len());
        for (summary, stats, limit) in results {
            if let Some(limit) = limit {
                limits.insert(summary.id.clone(), limit);
            }
            match stats {
                Ok(stats) => {
                    let usage = ContainerUsage::from_stats(
                        &summary,
                        &stats,
                        self.previous_cpu.get(&summary.id),
                        limit.flatten(),
                    );
                    previous.insert(summary.id.clone(), stats.cpu_stats);
                    usages.push(usage);
                }
                // The container may have exited between list and stats
                Err(e) => log::debug!("Skipping container {}: {}", summary.short_id(), e),
            }
        }
        // Forget containers that went away
        self.cpu_limits = limits;
        self.previous_cpu = previous;

        usages.sort_by(|a, b| a.name.cmp(&b.name));
        let total_cpu: f64 = usages.iter().map(|u| u.cpu_percent).sum();
        let total_memory: u64 = usages.iter().map(|u| u.memory_usage).sum();

        Ok(Snapshot::new(SourceId::Docker)
            .with(CONTAINER_COUNT, usages.len() as f64)
            .with(TOTAL_CPU, total_cpu)
            .with(TOTAL_MEMORY, total_memory as f64)
            .with_entities(usages.iter().map(ContainerUsage::to_entity).collect()))
    }
}
