// UI and formatting module

pub mod formatters;
pub mod monitor_tui;

// Re-export commonly used items for cleaner imports
pub use formatters::{format_bytes, format_percent, format_rate, format_snapshot_time, truncate_to_width};
