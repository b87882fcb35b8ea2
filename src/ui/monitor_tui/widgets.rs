use ratatui::{
    prelude::*,
    widgets::{BarChart, Block, Borders, Gauge},
};

use super::view::Theme;

/// Create a gauge with color based on value thresholds
pub fn colored_gauge<'a>(theme: &Theme, value: f64, label: String) -> Gauge<'a> {
    let value = if value.is_finite() { value.clamp(0.0, 100.0) } else { 0.0 };
    Gauge::default()
        .gauge_style(theme.usage(value))
        .ratio(value / 100.0)
        .label(label)
}

/// Bar chart of the most recent samples that fit in `width` columns.
///
/// `scale` maps a sample to an integer bar height (bars are u64).
pub fn trend_chart<'a>(
    theme: &Theme,
    title: String,
    samples: &[f64],
    width: u16,
    scale: f64,
    max: u64,
    color: Color,
) -> BarChart<'a> {
    let inner_width = width.saturating_sub(2) as usize;
    let visible = inner_width.min(samples.len());
    let bars: Vec<(&'static str, u64)> = samples[samples.len() - visible..]
        .iter()
        .map(|v| ("", (v.max(0.0) * scale).round() as u64))
        .collect();

    BarChart::default()
        .block(Block::default().title(title).borders(Borders::ALL).border_style(theme.fg(color)))
        .bar_width(1)
        .bar_gap(0)
        .bar_style(theme.fg(color))
        .value_style(Style::default())
        .data(bars.as_slice())
        .max(max.max(1))
}
