use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table},
};

use super::view::{DashboardView, PanelView};
use super::widgets::{colored_gauge, trend_chart};
use crate::core::{RunState, SourceId};
use crate::sources::docker::{
    BLOCK_READ, BLOCK_WRITE, CONTAINER_COUNT, CPU_LIMIT, CPU_PERCENT, MEM_LIMIT, MEM_PERCENT,
    MEM_USAGE, NET_RX, NET_TX, PIDS, TOTAL_CPU, TOTAL_MEMORY,
};
use crate::sources::fps::{
    FPS_AVG, FPS_LATEST, FPS_MAX, FPS_MEDIAN, FPS_MIN, STREAM_ANALYZE, STREAM_COUNT,
};
use crate::sources::os;
use crate::sources::process::{PID, PROCESS_COUNT, PROC_CPU, PROC_MEMORY, PROC_MEMORY_PERCENT};
use crate::ui::formatters::{format_bytes, format_percent, format_rate, truncate_to_width};

/// Container CPU above this is highlighted
const CONTAINER_CPU_ALERT: f64 = 80.0;

/// Main render function
pub fn render_dashboard(frame: &mut Frame, view: &DashboardView) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Panels
            Constraint::Length(1), // Footer
        ])
        .split(area);

    render_header(frame, chunks[0], view);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(chunks[1]);

    render_left_column(frame, columns[0], view);
    render_right_column(frame, columns[1], view);
    render_footer(frame, chunks[2], view);

    if view.ui.show_help {
        render_help_overlay(frame, area, view);
    }
}

fn render_header(frame: &mut Frame, area: Rect, view: &DashboardView) {
    let theme = &view.theme;
    let (state_label, state_style) = match view.state {
        RunState::Paused => (" PAUSED ", theme.fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        RunState::Running => ("", Style::default()),
        other => (other.label(), theme.fg(Color::DarkGray)),
    };

    let line = Line::from(vec![
        Span::styled(format!(" {} ", view.host.hostname), theme.bold()),
        Span::raw(format!("│ {} │ {} │ ", view.host.os, view.host.cpu_brand)),
        Span::styled(view.now.format("%H:%M:%S").to_string(), theme.fg(Color::Cyan)),
        Span::raw(" "),
        Span::styled(state_label, state_style),
    ]);

    let block = Block::default()
        .title(" xtop ")
        .title_bottom(Line::from(" Press 'q' to quit ").right_aligned())
        .borders(Borders::ALL)
        .border_style(theme.fg(Color::Blue));

    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_left_column(frame: &mut Frame, area: Rect, view: &DashboardView) {
    let basic_rows = basic_stat_rows(view);
    let system_lines = [SourceId::Cpu, SourceId::Memory, SourceId::Disk, SourceId::Network]
        .iter()
        .filter(|id| view.is_visible(**id))
        .count() as u16;
    let show_fps = view.is_visible(SourceId::Fps);

    let mut constraints = vec![Constraint::Length(basic_rows.len() as u16 + 3)];
    if system_lines > 0 {
        constraints.push(Constraint::Length(system_lines + 2));
    }
    if show_fps {
        constraints.push(Constraint::Length(7));
    }
    constraints.push(Constraint::Min(0));

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    let mut next = 0;
    render_basic_stats(frame, chunks[next], view, basic_rows);
    next += 1;
    if system_lines > 0 {
        render_system(frame, chunks[next], view);
        next += 1;
    }
    if show_fps {
        render_fps_throughput(frame, chunks[next], view);
    }
}

fn render_right_column(frame: &mut Frame, area: Rect, view: &DashboardView) {
    let show_docker = view.is_visible(SourceId::Docker);
    let show_trends = trend_series(view).next().is_some();
    let show_processes = view.is_visible(SourceId::Process);
    let show_streams = view.is_visible(SourceId::Fps);

    let mut constraints = Vec::new();
    if show_docker {
        let rows = view.panel(SourceId::Docker).entities().len() as u16;
        constraints.push(Constraint::Length((rows + 3).clamp(4, 14)));
    }
    if show_trends {
        constraints.push(Constraint::Length(8));
    }
    if show_processes {
        constraints.push(Constraint::Min(5));
    }
    if show_streams {
        let rows = view.panel(SourceId::Fps).entities().len() as u16;
        constraints.push(Constraint::Length((rows + 3).clamp(4, 10)));
    }
    if !show_processes {
        constraints.push(Constraint::Min(0));
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    let mut next = 0;
    if show_docker {
        render_containers(frame, chunks[next], view);
        next += 1;
    }
    if show_trends {
        render_trends(frame, chunks[next], view);
        next += 1;
    }
    if show_processes {
        render_processes(frame, chunks[next], view);
        next += 1;
    }
    if show_streams {
        render_streams(frame, chunks[next], view);
    }
}

fn panel_block<'a>(view: &DashboardView, panel: &PanelView, title: &str) -> Block<'a> {
    Block::default()
        .title(panel.title(title))
        .borders(Borders::ALL)
        .border_style(view.theme.border(panel))
}

fn header_row<'a>(view: &DashboardView, titles: &[&'a str]) -> Row<'a> {
    Row::new(
        titles
            .iter()
            .map(|t| Cell::from(*t).style(view.theme.bold()))
            .collect::<Vec<_>>(),
    )
    .height(1)
}

/// Rows of the "Basic Stats" table, one per visible source
fn basic_stat_rows(view: &DashboardView) -> Vec<(&'static str, String)> {
    let mut rows = Vec::new();
    if view.is_visible(SourceId::Fps) {
        let fps = view.panel(SourceId::Fps).value(FPS_LATEST).unwrap_or(0.0);
        rows.push(("Fps", format!("{:.2}", fps)));
    }
    if view.is_visible(SourceId::Cpu) {
        let cpu = view.panel(SourceId::Cpu).value(os::CPU_USAGE).unwrap_or(0.0);
        rows.push(("CPU", format_percent(cpu)));
    }
    if view.is_visible(SourceId::Memory) {
        let mem = view.panel(SourceId::Memory).value(os::MEM_USAGE).unwrap_or(0.0);
        rows.push(("Memory", format_percent(mem)));
    }
    if view.is_visible(SourceId::Docker) {
        let docker = view.panel(SourceId::Docker);
        rows.push((
            "Containers",
            format!("{:.0}", docker.value(CONTAINER_COUNT).unwrap_or(0.0)),
        ));
        rows.push((
            "Container CPU",
            format_percent(docker.value(TOTAL_CPU).unwrap_or(0.0)),
        ));
        rows.push((
            "Container Mem",
            format_bytes(docker.value(TOTAL_MEMORY).unwrap_or(0.0) as u64),
        ));
    }
    rows
}

fn render_basic_stats(
    frame: &mut Frame,
    area: Rect,
    view: &DashboardView,
    rows: Vec<(&'static str, String)>,
) {
    let rows: Vec<Row> = rows
        .into_iter()
        .map(|(name, value)| Row::new(vec![Cell::from(name), Cell::from(value)]))
        .collect();

    let table = Table::new(rows, [Constraint::Percentage(50), Constraint::Percentage(50)])
        .header(header_row(view, &["Name", "Value"]))
        .block(
            Block::default()
                .title(" Basic Stats ")
                .borders(Borders::ALL)
                .border_style(view.theme.fg(Color::Cyan)),
        );
    frame.render_widget(table, area);
}

/// Suffix marking a row whose source is not fresh
fn health_marker(panel: &PanelView) -> &'static str {
    if panel.is_stale() {
        " [stale]"
    } else if panel.status.permission_flagged {
        " [permission denied]"
    } else {
        ""
    }
}

/// Four sources share the System panel; each line carries its own snapshot
/// time and marker, the border follows the worst of them.
fn render_system(frame: &mut Frame, area: Rect, view: &DashboardView) {
    let theme = &view.theme;
    let visible: Vec<SourceId> = [SourceId::Cpu, SourceId::Memory, SourceId::Disk, SourceId::Network]
        .into_iter()
        .filter(|id| view.is_visible(*id))
        .collect();
    let panels: Vec<&PanelView> = visible.iter().map(|id| view.panel(*id)).collect();

    let block = Block::default()
        .title(" System ")
        .borders(Borders::ALL)
        .border_style(theme.shared_border(&panels));
    let inner = block.inner(area);
    frame.render_widget(block, area);
    let lines = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Length(1); visible.len()])
        .split(inner);

    for (id, line) in visible.into_iter().zip(lines.iter()) {
        let panel = view.panel(id);
        let marker = format!("{}{}", panel.stamp(), health_marker(panel));
        match id {
            SourceId::Cpu => {
                let usage = panel.value(os::CPU_USAGE).unwrap_or(0.0);
                let label = format!(
                    "CPU {} │ load {:.2} {:.2} {:.2}{}",
                    format_percent(usage),
                    panel.value(os::LOAD_1).unwrap_or(0.0),
                    panel.value(os::LOAD_5).unwrap_or(0.0),
                    panel.value(os::LOAD_15).unwrap_or(0.0),
                    marker
                );
                frame.render_widget(colored_gauge(theme, usage, label), *line);
            }
            SourceId::Memory => {
                let usage = panel.value(os::MEM_USAGE).unwrap_or(0.0);
                let label = format!(
                    "MEM {} / {} ({}){}",
                    format_bytes(panel.value(os::MEM_USED).unwrap_or(0.0) as u64),
                    format_bytes(panel.value(os::MEM_TOTAL).unwrap_or(0.0) as u64),
                    format_percent(usage),
                    marker
                );
                frame.render_widget(colored_gauge(theme, usage, label), *line);
            }
            SourceId::Disk => {
                let usage = panel.value(os::DISK_USAGE).unwrap_or(0.0);
                let label = format!(
                    "DISK {} / {} ({}){}",
                    format_bytes(panel.value(os::DISK_USED).unwrap_or(0.0) as u64),
                    format_bytes(panel.value(os::DISK_TOTAL).unwrap_or(0.0) as u64),
                    format_percent(usage),
                    marker
                );
                frame.render_widget(colored_gauge(theme, usage, label), *line);
            }
            SourceId::Network => {
                let text = format!(
                    "NET ↓ {} ↑ {}{}",
                    format_rate(panel.value(os::NET_RX_RATE).unwrap_or(0.0)),
                    format_rate(panel.value(os::NET_TX_RATE).unwrap_or(0.0)),
                    marker
                );
                frame.render_widget(Paragraph::new(text), *line);
            }
            _ => {}
        }
    }
}

fn render_fps_throughput(frame: &mut Frame, area: Rect, view: &DashboardView) {
    let panel = view.panel(SourceId::Fps);
    let rows = [
        ("Median", FPS_MEDIAN),
        ("Average", FPS_AVG),
        ("Min", FPS_MIN),
        ("Max", FPS_MAX),
    ]
    .into_iter()
    .map(|(name, key)| {
        Row::new(vec![
            Cell::from(name),
            Cell::from(format!("{:.2}", panel.value(key).unwrap_or(0.0))),
        ])
    })
    .collect::<Vec<_>>();

    let table = Table::new(rows, [Constraint::Percentage(50), Constraint::Percentage(50)])
        .header(header_row(view, &["Stat", "FPS"]))
        .block(panel_block(view, panel, "FPS Throughput"));
    frame.render_widget(table, area);
}

fn render_containers(frame: &mut Frame, area: Rect, view: &DashboardView) {
    let theme = &view.theme;
    let panel = view.panel(SourceId::Docker);

    let rows: Vec<Row> = panel
        .entities()
        .iter()
        .map(|c| {
            let value = |name: &str| c.value(name).unwrap_or(0.0);
            let cpu = value(CPU_PERCENT);
            let cpu_style = if cpu > CONTAINER_CPU_ALERT {
                theme.fg(Color::Red)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(c.key.clone()),
                Cell::from(truncate_to_width(&c.label, 24)),
                Cell::from(format!("{:.1}% / {:.1}", cpu, value(CPU_LIMIT))).style(cpu_style),
                Cell::from(format!(
                    "{} / {}",
                    format_bytes(value(MEM_USAGE) as u64),
                    format_bytes(value(MEM_LIMIT) as u64)
                )),
                Cell::from(format_percent(value(MEM_PERCENT))),
                Cell::from(format!(
                    "{} / {}",
                    format_bytes(value(NET_RX) as u64),
                    format_bytes(value(NET_TX) as u64)
                )),
                Cell::from(format!(
                    "{} / {}",
                    format_bytes(value(BLOCK_READ) as u64),
                    format_bytes(value(BLOCK_WRITE) as u64)
                )),
                Cell::from(format!("{:.0}", value(PIDS))),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Min(10),
            Constraint::Length(14),
            Constraint::Length(21),
            Constraint::Length(7),
            Constraint::Length(21),
            Constraint::Length(21),
            Constraint::Length(5),
        ],
    )
    .header(header_row(
        view,
        &["ID", "NAME", "CPU % / LIMIT", "MEM USAGE / LIMIT", "MEM %", "NET I/O", "BLOCK I/O", "PIDS"],
    ))
    .block(panel_block(view, panel, "Containers"));

    frame.render_widget(table, area);
}

/// Visible history series: (title, panel, value key, bar scale, bar max, color)
fn trend_series(
    view: &DashboardView,
) -> impl Iterator<Item = (&'static str, &PanelView, &'static str, f64, u64, Color)> {
    let fps_max = view
        .panel(SourceId::Fps)
        .series(FPS_LATEST)
        .into_iter()
        .fold(0.0_f64, f64::max);
    // One frame above the peak, 20 when idle
    let fps_ceiling = if fps_max > 0.0 { fps_max.floor() as u64 + 1 } else { 20 };

    [
        ("CPU %", SourceId::Cpu, os::CPU_USAGE, 10.0, 1000, Color::Cyan),
        ("Memory %", SourceId::Memory, os::MEM_USAGE, 10.0, 1000, Color::Magenta),
        ("FPS", SourceId::Fps, FPS_LATEST, 1.0, fps_ceiling, Color::White),
    ]
    .into_iter()
    .filter(move |(_, id, ..)| view.is_visible(*id))
    .map(move |(title, id, key, scale, max, color)| (title, view.panel(id), key, scale, max, color))
}

fn render_trends(frame: &mut Frame, area: Rect, view: &DashboardView) {
    let series: Vec<_> = trend_series(view).collect();
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(vec![Constraint::Ratio(1, series.len() as u32); series.len()])
        .split(area);

    for ((title, panel, key, scale, max, color), chunk) in series.into_iter().zip(chunks.iter()) {
        let samples = panel.series(key);
        let title = format!(" {} ({}s) ", title, panel.history.len());
        let chart = trend_chart(&view.theme, title, &samples, chunk.width, scale, max, color);
        frame.render_widget(chart, *chunk);
    }
}

fn render_processes(frame: &mut Frame, area: Rect, view: &DashboardView) {
    let panel = view.panel(SourceId::Process);
    let arrow = if view.ui.reverse { "↑" } else { "↓" };
    let title = format!(
        "Processes ({:.0}) sort: {}{}",
        panel.value(PROCESS_COUNT).unwrap_or(0.0),
        view.ui.sort_key.label(),
        arrow
    );

    let rows: Vec<Row> = view
        .processes
        .iter()
        .map(|p| {
            let cpu = p.value(PROC_CPU).unwrap_or(0.0);
            Row::new(vec![
                Cell::from(format!("{:.0}", p.value(PID).unwrap_or(0.0))),
                Cell::from(truncate_to_width(&p.label, 32)),
                Cell::from(format_percent(cpu)).style(view.theme.usage(cpu)),
                Cell::from(format_bytes(p.value(PROC_MEMORY).unwrap_or(0.0) as u64)),
                Cell::from(format_percent(p.value(PROC_MEMORY_PERCENT).unwrap_or(0.0))),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Percentage(45),
            Constraint::Length(8),
            Constraint::Length(12),
            Constraint::Length(8),
        ],
    )
    .header(header_row(view, &["PID", "Name", "CPU %", "Memory", "MEM %"]))
    .block(panel_block(view, panel, &title));

    frame.render_widget(table, area);
}

fn render_streams(frame: &mut Frame, area: Rect, view: &DashboardView) {
    let panel = view.panel(SourceId::Fps);
    let title = format!("Streams ({:.0})", panel.value(STREAM_COUNT).unwrap_or(0.0));

    let rows: Vec<Row> = panel
        .entities()
        .iter()
        .map(|s| {
            let value = |name: &str| format!("{:.2}", s.value(name).unwrap_or(0.0));
            // T: analyzed, K: kept only, -: not configured on the server
            let analysis = match s.value(STREAM_ANALYZE) {
                Some(flag) if flag > 0.0 => "T",
                Some(_) => "K",
                None => "-",
            };
            Row::new(vec![
                Cell::from(analysis),
                Cell::from(truncate_to_width(&s.key, 6)),
                Cell::from(truncate_to_width(&s.label, 24)),
                Cell::from(value(FPS_LATEST)),
                Cell::from(value(FPS_AVG)),
                Cell::from(value(FPS_MIN)),
                Cell::from(value(FPS_MAX)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(10),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(8),
        ],
    )
    .header(header_row(view, &["A/K", "ID", "NAME", "FPS", "AVG", "MIN", "MAX"]))
    .block(panel_block(view, panel, &title));

    frame.render_widget(table, area);
}

fn render_footer(frame: &mut Frame, area: Rect, view: &DashboardView) {
    let pause = if view.state == RunState::Paused { "Resume" } else { "Pause" };
    let help = format!(
        " q: Quit │ p: {} │ s: Sort ({}) │ r: Reverse │ ?: Help ",
        pause,
        view.ui.sort_key.label()
    );
    let para = Paragraph::new(help).style(view.theme.fg(Color::DarkGray));
    frame.render_widget(para, area);
}

fn render_help_overlay(frame: &mut Frame, area: Rect, view: &DashboardView) {
    let help_text = r#"
    xtop - Help

    Keyboard Shortcuts:
    ─────────────────────────────────────
    q / Esc / Ctrl-C   Quit
    p / Space          Pause or resume
    s                  Cycle process sort (cpu/mem/pid/name)
    r                  Reverse sort order
    ? / h              Toggle this help screen

    Panels marked [stale] missed 3 updates in a row
    "#;

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(view.theme.fg(Color::Yellow));

    let paragraph = Paragraph::new(help_text)
        .block(block)
        .alignment(Alignment::Left);

    // Center the help popup
    let popup_area = centered_rect(60, 50, area);
    frame.render_widget(Clear, popup_area);
    frame.render_widget(paragraph, popup_area);
}

/// Helper function to create a centered rect
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
