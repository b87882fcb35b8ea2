// Core runtime: snapshots, history, state store, lifecycle and scheduler

pub mod history;
pub mod lifecycle;
pub mod scheduler;
pub mod snapshot;
pub mod store;

// Re-export commonly used items
pub use history::{HistoryRing, DEFAULT_HISTORY_SIZE, MAX_HISTORY_SIZE};
pub use lifecycle::{Lifecycle, RunState};
pub use scheduler::{Scheduler, SourceDescriptor};
pub use snapshot::{parse_source_list, Entity, Snapshot, SourceId};
pub use store::{SourceHealth, SourceStatus, StateStore, STALE_AFTER_FAILURES};
