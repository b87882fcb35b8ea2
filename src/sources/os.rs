//! OS counters: CPU, memory, disk and network, each its own source.
//!
//! sysinfo refreshes are synchronous, so every fetch hops onto the blocking
//! pool. The collector state lives behind a mutex so a fetch abandoned by
//! the scheduler's timeout cannot race the next one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};

use super::{run_blocking, MetricSource};
use crate::core::{Entity, Snapshot, SourceId};
use crate::error::FetchError;

pub const CPU_USAGE: &str = "usage_percent";
pub const CPU_CORES: &str = "cores";
pub const LOAD_1: &str = "load_1";
pub const LOAD_5: &str = "load_5";
pub const LOAD_15: &str = "load_15";
pub const CORE_FREQUENCY: &str = "frequency_mhz";

pub const MEM_TOTAL: &str = "total_bytes";
pub const MEM_USED: &str = "used_bytes";
pub const MEM_AVAILABLE: &str = "available_bytes";
pub const MEM_USAGE: &str = "usage_percent";
pub const SWAP_TOTAL: &str = "swap_total_bytes";
pub const SWAP_USED: &str = "swap_used_bytes";
pub const SWAP_USAGE: &str = "swap_percent";

pub const DISK_TOTAL: &str = "total_bytes";
pub const DISK_USED: &str = "used_bytes";
pub const DISK_AVAILABLE: &str = "available_bytes";
pub const DISK_USAGE: &str = "usage_percent";

pub const NET_RX_RATE: &str = "rx_bytes_per_sec";
pub const NET_TX_RATE: &str = "tx_bytes_per_sec";
pub const NET_RX_TOTAL: &str = "rx_bytes_total";
pub const NET_TX_TOTAL: &str = "tx_bytes_total";

fn percent(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}

/// Global CPU usage, load average and per-core readings.
pub struct CpuSource {
    system: Arc<Mutex<System>>,
    primed: bool,
}

impl CpuSource {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing().with_cpu(CpuRefreshKind::everything());
        Self {
            system: Arc::new(Mutex::new(System::new_with_specifics(refresh_kind))),
            primed: false,
        }
    }

    /// CPU brand string of the first core, for the dashboard header
    pub fn cpu_brand() -> String {
        let refresh_kind = RefreshKind::nothing().with_cpu(CpuRefreshKind::everything());
        let system = System::new_with_specifics(refresh_kind);
        system
            .cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "Unknown CPU".to_string())
    }
}

impl Default for CpuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for CpuSource {
    fn id(&self) -> SourceId {
        SourceId::Cpu
    }

    async fn fetch(&mut self) -> Result<Snapshot, FetchError> {
        let system = Arc::clone(&self.system);
        // Usage is a delta between two refreshes; the first call needs a baseline
        let prime = !self.primed;
        self.primed = true;

        run_blocking(SourceId::Cpu, move || {
            let mut system = system.lock();
            if prime {
                system.refresh_cpu_all();
                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            }
            system.refresh_cpu_all();

            let load = System::load_average();
            let cores: Vec<Entity> = system
                .cpus()
                .iter()
                .enumerate()
                .map(|(i, cpu)| {
                    Entity::new(format!("cpu{}", i), format!("C{:02}", i))
                        .with(CPU_USAGE, cpu.cpu_usage() as f64)
                        .with(CORE_FREQUENCY, cpu.frequency() as f64)
                })
                .collect();

            Ok(Snapshot::new(SourceId::Cpu)
                .with(CPU_USAGE, system.global_cpu_usage() as f64)
                .with(CPU_CORES, cores.len() as f64)
                .with(LOAD_1, load.one)
                .with(LOAD_5, load.five)
                .with(LOAD_15, load.fifteen)
                .with_entities(cores))
        })
        .await
    }
}

/// RAM and swap usage.
pub struct MemorySource {
    system: Arc<Mutex<System>>,
}

impl MemorySource {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing().with_memory(MemoryRefreshKind::everything());
        Self {
            system: Arc::new(Mutex::new(System::new_with_specifics(refresh_kind))),
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for MemorySource {
    fn id(&self) -> SourceId {
        SourceId::Memory
    }

    async fn fetch(&mut self) -> Result<Snapshot, FetchError> {
        let system = Arc::clone(&self.system);
        run_blocking(SourceId::Memory, move || {
            let mut system = system.lock();
            system.refresh_memory();

            let total = system.total_memory();
            let used = system.used_memory();
            let swap_total = system.total_swap();
            let swap_used = system.used_swap();
            if total == 0 {
                return Err(FetchError::not_available("memory counters unavailable"));
            }

            Ok(Snapshot::new(SourceId::Memory)
                .with(MEM_TOTAL, total as f64)
                .with(MEM_USED, used as f64)
                .with(MEM_AVAILABLE, system.available_memory() as f64)
                .with(MEM_USAGE, percent(used, total))
                .with(SWAP_TOTAL, swap_total as f64)
                .with(SWAP_USED, swap_used as f64)
                .with(SWAP_USAGE, percent(swap_used, swap_total)))
        })
        .await
    }
}

/// Usage of one mounted filesystem
#[derive(Debug, Clone, PartialEq)]
pub struct DiskUsage {
    pub mount_point: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl DiskUsage {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }
}

/// Headline disk figures: the root mount when present, otherwise all disks summed.
pub fn summarize_disks(disks: &[DiskUsage]) -> (u64, u64) {
    if let Some(root) = disks.iter().find(|d| d.mount_point == "/") {
        return (root.total_bytes, root.used_bytes());
    }
    disks
        .iter()
        .fold((0, 0), |(total, used), d| (total + d.total_bytes, used + d.used_bytes()))
}

/// Mounted filesystem usage.
pub struct DiskSource {
    disks: Arc<Mutex<Disks>>,
}

impl DiskSource {
    pub fn new() -> Self {
        Self {
            disks: Arc::new(Mutex::new(Disks::new_with_refreshed_list())),
        }
    }
}

impl Default for DiskSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for DiskSource {
    fn id(&self) -> SourceId {
        SourceId::Disk
    }

    async fn fetch(&mut self) -> Result<Snapshot, FetchError> {
        let disks = Arc::clone(&self.disks);
        run_blocking(SourceId::Disk, move || {
            let mut disks = disks.lock();
            disks.refresh(true);

            let usage: Vec<DiskUsage> = disks
                .iter()
                .map(|disk| DiskUsage {
                    mount_point: disk.mount_point().to_string_lossy().to_string(),
                    total_bytes: disk.total_space(),
                    available_bytes: disk.available_space(),
                })
                .collect();
            if usage.is_empty() {
                return Err(FetchError::not_available("no mounted disks reported"));
            }

            let (total, used) = summarize_disks(&usage);
            let entities = usage
                .iter()
                .map(|d| {
                    Entity::new(d.mount_point.clone(), d.mount_point.clone())
                        .with(DISK_TOTAL, d.total_bytes as f64)
                        .with(DISK_AVAILABLE, d.available_bytes as f64)
                        .with(DISK_USAGE, percent(d.used_bytes(), d.total_bytes))
                })
                .collect();

            Ok(Snapshot::new(SourceId::Disk)
                .with(DISK_TOTAL, total as f64)
                .with(DISK_USED, used as f64)
                .with(DISK_USAGE, percent(used, total))
                .with_entities(entities))
        })
        .await
    }
}

/// Bytes per second between two cumulative counter readings
pub fn counter_rate(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    current.saturating_sub(previous) as f64 / elapsed_secs
}

struct NetworkState {
    networks: Networks,
    last_update: Option<Instant>,
    last_totals: HashMap<String, (u64, u64)>,
}

/// Upload/download rates per interface and in total.
pub struct NetworkSource {
    state: Arc<Mutex<NetworkState>>,
}

impl NetworkSource {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(NetworkState {
                networks: Networks::new_with_refreshed_list(),
                last_update: None,
                last_totals: HashMap::new(),
            })),
        }
    }
}

impl Default for NetworkSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for NetworkSource {
    fn id(&self) -> SourceId {
        SourceId::Network
    }

    async fn fetch(&mut self) -> Result<Snapshot, FetchError> {
        let state = Arc::clone(&self.state);
        run_blocking(SourceId::Network, move || {
            let mut state = state.lock();
            state.networks.refresh(true);

            let now = Instant::now();
            let elapsed_secs = state
                .last_update
                .map(|t| now.duration_since(t).as_secs_f64())
                .unwrap_or(0.0);

            let mut totals = HashMap::new();
            let mut entities = Vec::new();
            let (mut rx_rate, mut tx_rate, mut rx_total, mut tx_total) = (0.0, 0.0, 0u64, 0u64);

            for (name, data) in state.networks.iter() {
                let rx = data.total_received();
                let tx = data.total_transmitted();
                let (prev_rx, prev_tx) = state.last_totals.get(name).copied().unwrap_or((rx, tx));
                let iface_rx = counter_rate(prev_rx, rx, elapsed_secs);
                let iface_tx = counter_rate(prev_tx, tx, elapsed_secs);

                rx_rate += iface_rx;
                tx_rate += iface_tx;
                rx_total += rx;
                tx_total += tx;
                totals.insert(name.to_string(), (rx, tx));
                entities.push(
                    Entity::new(name.to_string(), name.to_string())
                        .with(NET_RX_RATE, iface_rx)
                        .with(NET_TX_RATE, iface_tx)
                        .with(NET_RX_TOTAL, rx as f64)
                        .with(NET_TX_TOTAL, tx as f64),
                );
            }
            entities.sort_by(|a, b| a.key.cmp(&b.key));

            state.last_update = Some(now);
            state.last_totals = totals;

            Ok(Snapshot::new(SourceId::Network)
                .with(NET_RX_RATE, rx_rate)
                .with(NET_TX_RATE, tx_rate)
                .with(NET_RX_TOTAL, rx_total as f64)
                .with(NET_TX_TOTAL, tx_total as f64)
                .with_entities(entities))
        })
        .await
    }
}
