//! Process table source.
//!
//! The dashboard sorts the table by a key the user picks at any time, so the
//! adapter keeps every process that could reach the visible rows under some
//! key and direction, not just the busiest ones.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use sysinfo::{MemoryRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

use super::{run_blocking, MetricSource};
use crate::core::{Entity, Snapshot, SourceId};
use crate::error::FetchError;

pub const PROCESS_COUNT: &str = "process_count";
pub const PID: &str = "pid";
pub const PROC_CPU: &str = "cpu_percent";
pub const PROC_MEMORY: &str = "memory_bytes";
pub const PROC_MEMORY_PERCENT: &str = "memory_percent";

/// Process table ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Cpu,
    Memory,
    Pid,
    Name,
}

impl SortKey {
    pub const ALL: [SortKey; 4] = [SortKey::Cpu, SortKey::Memory, SortKey::Pid, SortKey::Name];

    pub fn next(self) -> Self {
        match self {
            SortKey::Cpu => SortKey::Memory,
            SortKey::Memory => SortKey::Pid,
            SortKey::Pid => SortKey::Name,
            SortKey::Name => SortKey::Cpu,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Cpu => "cpu",
            SortKey::Memory => "mem",
            SortKey::Pid => "pid",
            SortKey::Name => "name",
        }
    }
}

/// Order process rows by `key`. Numeric keys sort high-to-low, pid and name
/// low-to-high; `reverse` flips either.
pub fn sort_processes(processes: &[Entity], key: SortKey, reverse: bool) -> Vec<Entity> {
    let mut rows = processes.to_vec();
    let metric = |entity: &Entity, name: &str| {
        let v = entity.value(name).unwrap_or(0.0);
        if v.is_nan() {
            0.0
        } else {
            v
        }
    };
    rows.sort_by(|a, b| {
        let ordering = match key {
            SortKey::Cpu => metric(b, PROC_CPU).total_cmp(&metric(a, PROC_CPU)),
            SortKey::Memory => metric(b, PROC_MEMORY).total_cmp(&metric(a, PROC_MEMORY)),
            SortKey::Pid => metric(a, PID).total_cmp(&metric(b, PID)),
            SortKey::Name => a.label.to_lowercase().cmp(&b.label.to_lowercase()),
        };
        let ordering = ordering.then_with(|| metric(a, PID).total_cmp(&metric(b, PID)));
        if reverse {
            ordering.reverse()
        } else {
            ordering
        }
    });
    rows
}

/// Keep the processes that rank in the first `limit` rows under any sort key
/// in either direction, ordered by pid.
pub fn sort_candidates(processes: Vec<Entity>, limit: usize) -> Vec<Entity> {
    let mut keep: HashSet<String> = HashSet::new();
    for key in SortKey::ALL {
        for reverse in [false, true] {
            keep.extend(
                sort_processes(&processes, key, reverse)
                    .into_iter()
                    .take(limit)
                    .map(|e| e.key),
            );
        }
    }
    let kept: Vec<Entity> = processes.into_iter().filter(|e| keep.contains(&e.key)).collect();
    sort_processes(&kept, SortKey::Pid, false)
}

pub struct ProcessSource {
    system: Arc<Mutex<System>>,
    top: usize,
}

impl ProcessSource {
    pub fn new(top: usize) -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_memory(MemoryRefreshKind::nothing().with_ram())
            .with_processes(ProcessRefreshKind::nothing().with_cpu().with_memory());
        Self {
            system: Arc::new(Mutex::new(System::new_with_specifics(refresh_kind))),
            top: top.max(1),
        }
    }
}

impl MetricSource for ProcessSource {
    fn id(&self) -> SourceId {
        SourceId::Process
    }

    async fn fetch(&mut self) -> Result<Snapshot, FetchError> {
        let system = Arc::clone(&self.system);
        let top = self.top;

        run_blocking(SourceId::Process, move || {
            let mut system = system.lock();
            system.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
            system.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing().with_cpu().with_memory(),
            );

            let total_memory = system.total_memory();
            let processes: Vec<Entity> = system
                .processes()
                .values()
                .map(|proc| {
                    let pid = proc.pid().as_u32();
                    let memory = proc.memory();
                    let memory_percent = if total_memory > 0 {
                        memory as f64 / total_memory as f64 * 100.0
                    } else {
                        0.0
                    };
                    Entity::new(pid.to_string(), proc.name().to_string_lossy())
                        .with(PID, pid as f64)
                        .with(PROC_CPU, proc.cpu_usage() as f64)
                        .with(PROC_MEMORY, memory as f64)
                        .with(PROC_MEMORY_PERCENT, memory_percent)
                })
                .collect();
            let count = processes.len();
            let entities = sort_candidates(processes, top);

            Ok(Snapshot::new(SourceId::Process)
                .with(PROCESS_COUNT, count as f64)
                .with_entities(entities))
        })
        .await
    }
}
