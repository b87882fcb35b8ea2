use chrono::{DateTime, Local, Utc};
use humansize::{format_size, BINARY};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Format a byte count with binary units (B, KiB, MiB, ...)
pub fn format_bytes(bytes: u64) -> String {
    format_size(bytes, BINARY)
}

/// Format a transfer rate the way network panels show it (KB/s below 1 MiB/s)
pub fn format_rate(bytes_per_sec: f64) -> String {
    let bytes_per_sec = bytes_per_sec.max(0.0);
    if bytes_per_sec < 1024.0 * 1024.0 {
        format!("{:.1}KB/s", bytes_per_sec / 1024.0)
    } else {
        format!("{:.1}MB/s", bytes_per_sec / (1024.0 * 1024.0))
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Local wall-clock time of a snapshot (HH:MM:SS)
pub fn format_snapshot_time(taken_at: DateTime<Utc>) -> String {
    taken_at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// Cut `text` to at most `max_width` terminal columns, marking the cut with `…`.
pub fn truncate_to_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }

    let mut result = String::new();
    let mut width = 0;
    for ch in text.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if width + ch_width > max_width - 1 {
            break;
        }
        result.push(ch);
        width += ch_width;
    }
    result.push('…');
    result
}
