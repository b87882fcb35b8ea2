//! Aggregate state store shared between the scheduler and the renderer.
//!
//! Every source owns one slot guarded by its own lock, so a slow writer for
//! one source never blocks readers of another. Snapshots are stored as
//! `Arc<Snapshot>`: a write swaps whole snapshots in, readers get copies of
//! the slot contents and never see a half-written value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::history::{HistoryRing, DEFAULT_HISTORY_SIZE};
use super::snapshot::{Snapshot, SourceId};
use crate::error::FetchError;

/// Consecutive failures after which a source is displayed as stale
pub const STALE_AFTER_FAILURES: u32 = 3;

/// Displayed condition of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceHealth {
    /// Enabled but no fetch has completed yet
    Pending,
    Healthy,
    /// Failed recently, fewer than `STALE_AFTER_FAILURES` times in a row
    Degraded,
    Stale,
    /// Dependency missing; the panel is hidden
    Unavailable,
    Disabled,
}

/// Read-only copy of a source descriptor, published by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStatus {
    pub source: SourceId,
    pub enabled: bool,
    pub interval: Duration,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<FetchError>,
    pub consecutive_failures: u32,
    /// Set on the first permission failure and kept for the whole session
    pub permission_flagged: bool,
}

impl SourceStatus {
    pub fn disabled(source: SourceId) -> Self {
        Self {
            source,
            enabled: false,
            interval: source.default_interval(),
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
            permission_flagged: false,
        }
    }

    pub fn health(&self) -> SourceHealth {
        if !self.enabled {
            return SourceHealth::Disabled;
        }
        if self.consecutive_failures == 0 {
            return if self.last_success.is_some() {
                SourceHealth::Healthy
            } else {
                SourceHealth::Pending
            };
        }
        match self.last_error {
            Some(FetchError::NotAvailable(_)) => SourceHealth::Unavailable,
            _ if self.consecutive_failures >= STALE_AFTER_FAILURES => SourceHealth::Stale,
            _ => SourceHealth::Degraded,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.health() == SourceHealth::Stale
    }
}

struct SourceSlot {
    latest: Option<Arc<Snapshot>>,
    history: HistoryRing<Arc<Snapshot>>,
    status: SourceStatus,
}

struct StoreInner {
    slots: [RwLock<SourceSlot>; SourceId::COUNT],
    capacity: usize,
    writes: AtomicU64,
}

/// Cheap-to-clone handle to the shared dashboard state.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let slots = std::array::from_fn(|i| {
            RwLock::new(SourceSlot {
                latest: None,
                history: HistoryRing::with_capacity(capacity),
                status: SourceStatus::disabled(SourceId::ALL[i]),
            })
        });
        Self {
            inner: Arc::new(StoreInner {
                slots,
                capacity: capacity.max(1),
                writes: AtomicU64::new(0),
            }),
        }
    }

    fn slot(&self, id: SourceId) -> &RwLock<SourceSlot> {
        &self.inner.slots[id.index()]
    }

    /// Latest snapshot for a source, if it ever produced one
    pub fn latest(&self, id: SourceId) -> Option<Arc<Snapshot>> {
        self.slot(id).read().latest.clone()
    }

    /// Copy of the source's history, oldest first
    pub fn history(&self, id: SourceId) -> Vec<Arc<Snapshot>> {
        self.slot(id).read().history.to_vec()
    }

    /// Latest snapshot and history read under one lock
    pub fn read_source(&self, id: SourceId) -> (Option<Arc<Snapshot>>, Vec<Arc<Snapshot>>, SourceStatus) {
        let slot = self.slot(id).read();
        (slot.latest.clone(), slot.history.to_vec(), slot.status.clone())
    }

    /// Record a fresh snapshot. Only the scheduler calls this.
    pub fn write(&self, id: SourceId, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        {
            let mut slot = self.slot(id).write();
            slot.history.push(Arc::clone(&snapshot));
            slot.latest = Some(snapshot);
        }
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn status(&self, id: SourceId) -> SourceStatus {
        self.slot(id).read().status.clone()
    }

    pub fn publish_status(&self, status: SourceStatus) {
        let id = status.source;
        self.slot(id).write().status = status;
    }

    /// Total number of snapshot writes since creation
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::Relaxed)
    }

    pub fn history_capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
