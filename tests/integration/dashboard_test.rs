use std::time::Duration;

use chrono::{TimeZone, Utc};
use ratatui::backend::TestBackend;
use ratatui::style::Color;
use ratatui::Terminal;
use xtop::core::{Entity, RunState, Snapshot, SourceId, SourceStatus, StateStore};
use xtop::sources::{docker, fps, os, process};
use xtop::ui::format_snapshot_time;
use xtop::ui::monitor_tui::{
    DashboardView, FrameSink, HostInfo, SortKey, TerminalSink, Theme, UiState, DEFAULT_PROCESS_ROWS,
};
use xtop::FetchError;

const WIDTH: u16 = 200;
const HEIGHT: u16 = 60;

fn host() -> HostInfo {
    HostInfo {
        hostname: "test-host".into(),
        os: "Linux 6.1".into(),
        cpu_brand: "Test CPU".into(),
    }
}

fn healthy(id: SourceId) -> SourceStatus {
    let mut status = SourceStatus::disabled(id);
    status.enabled = true;
    status.last_success = Some(Utc::now());
    status
}

fn failing(id: SourceId, failures: u32, err: FetchError) -> SourceStatus {
    let mut status = healthy(id);
    status.consecutive_failures = failures;
    status.last_error = Some(err);
    status
}

/// A store with every source reporting one sample
fn populated_store() -> StateStore {
    let store = StateStore::new();

    store.write(
        SourceId::Cpu,
        Snapshot::new(SourceId::Cpu)
            .with(os::CPU_USAGE, 42.0)
            .with(os::LOAD_1, 0.5),
    );
    store.write(
        SourceId::Memory,
        Snapshot::new(SourceId::Memory)
            .with(os::MEM_USAGE, 63.0)
            .with(os::MEM_TOTAL, 16.0 * 1024.0 * 1024.0 * 1024.0),
    );
    store.write(SourceId::Disk, Snapshot::new(SourceId::Disk).with(os::DISK_USAGE, 71.0));
    store.write(
        SourceId::Network,
        Snapshot::new(SourceId::Network)
            .with(os::NET_RX_RATE, 2048.0)
            .with(os::NET_TX_RATE, 512.0),
    );
    store.write(
        SourceId::Process,
        Snapshot::new(SourceId::Process)
            .with(process::PROCESS_COUNT, 2.0)
            .with_entities(vec![
                Entity::new("101", "postgres")
                    .with(process::PID, 101.0)
                    .with(process::PROC_CPU, 12.5),
                Entity::new("202", "nginx")
                    .with(process::PID, 202.0)
                    .with(process::PROC_CPU, 3.0),
            ]),
    );
    store.write(
        SourceId::Docker,
        Snapshot::new(SourceId::Docker)
            .with(docker::CONTAINER_COUNT, 1.0)
            .with_entities(vec![Entity::new("0123456789ab", "web-1")
                .with(docker::CPU_PERCENT, 91.0)
                .with(docker::CPU_LIMIT, 2.0)]),
    );
    store.write(
        SourceId::Fps,
        Snapshot::new(SourceId::Fps)
            .with(fps::FPS_LATEST, 24.0)
            .with(fps::FPS_MEDIAN, 25.0)
            .with(fps::STREAM_COUNT, 1.0)
            .with_entities(vec![Entity::new("cam-1", "cam-1").with(fps::FPS_LATEST, 24.0)]),
    );

    for id in SourceId::ALL {
        store.publish_status(healthy(id));
    }
    store
}

fn draw(store: &StateStore, ui: UiState, state: RunState, theme: Theme) -> TerminalSink<TestBackend> {
    let terminal = Terminal::new(TestBackend::new(WIDTH, HEIGHT)).unwrap();
    let mut sink = TerminalSink::new(terminal);
    let view = DashboardView::build(store, &host(), ui, state, theme, DEFAULT_PROCESS_ROWS);
    sink.draw(&view).unwrap();
    sink
}

fn screen_text(sink: &TerminalSink<TestBackend>) -> String {
    let buffer = sink.terminal().backend().buffer();
    let width = buffer.area.width as usize;
    buffer
        .content
        .chunks(width)
        .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_running(store: &StateStore) -> String {
    screen_text(&draw(store, UiState::default(), RunState::Running, Theme::new(true)))
}

#[test]
fn test_full_dashboard_shows_every_panel() {
    let screen = render_running(&populated_store());

    for expected in [
        "xtop",
        "test-host",
        "Press 'q' to quit",
        "Basic Stats",
        "System",
        "FPS Throughput",
        "Containers",
        "Processes (2) sort: cpu↓",
        "Streams (1)",
        "CPU %",
        "web-1",
        "0123456789ab",
        "postgres",
        "cam-1",
        "q: Quit",
    ] {
        assert!(screen.contains(expected), "missing {:?} in\n{}", expected, screen);
    }
    assert!(!screen.contains("PAUSED"));
    assert!(!screen.contains("[stale]"));
}

#[test]
fn test_processes_follow_sort_key() {
    let store = populated_store();
    let by_cpu = render_running(&store);
    assert!(by_cpu.find("postgres").unwrap() < by_cpu.find("nginx").unwrap());

    let ui = UiState {
        reverse: true,
        ..Default::default()
    };
    let reversed = screen_text(&draw(&store, ui, RunState::Running, Theme::new(true)));
    assert!(reversed.find("nginx").unwrap() < reversed.find("postgres").unwrap());
    assert!(reversed.contains("sort: cpu↑"));
}

#[test]
fn test_stale_source_keeps_last_data_with_marker() {
    let store = populated_store();
    store.publish_status(failing(
        SourceId::Docker,
        3,
        FetchError::Timeout(Duration::from_secs(2)),
    ));

    let screen = render_running(&store);
    assert!(screen.contains("[stale]"));
    // Last good sample stays on screen
    assert!(screen.contains("web-1"));
}

#[test]
fn test_degraded_source_has_no_marker() {
    let store = populated_store();
    store.publish_status(failing(
        SourceId::Docker,
        1,
        FetchError::Timeout(Duration::from_secs(2)),
    ));
    assert!(!render_running(&store).contains("[stale]"));
}

#[test]
fn test_unavailable_source_is_hidden() {
    let store = populated_store();
    store.publish_status(failing(
        SourceId::Docker,
        1,
        FetchError::not_available("Docker socket not found"),
    ));
    store.publish_status(SourceStatus::disabled(SourceId::Fps));

    let screen = render_running(&store);
    assert!(!screen.contains("Containers"));
    assert!(!screen.contains("FPS Throughput"));
    assert!(!screen.contains("Streams"));
    assert!(screen.contains("Processes"));
}

#[test]
fn test_permission_marker() {
    let store = populated_store();
    let mut status = failing(
        SourceId::Process,
        1,
        FetchError::permission_denied("/proc/1/stat"),
    );
    status.permission_flagged = true;
    store.publish_status(status);

    assert!(render_running(&store).contains("[permission denied]"));
}

#[test]
fn test_paused_header_and_help_overlay() {
    let store = populated_store();
    let paused = screen_text(&draw(&store, UiState::default(), RunState::Paused, Theme::new(true)));
    assert!(paused.contains("PAUSED"));
    assert!(paused.contains("p: Resume"));

    let ui = UiState {
        show_help: true,
        ..Default::default()
    };
    let help = screen_text(&draw(&store, ui, RunState::Running, Theme::new(true)));
    assert!(help.contains("Keyboard Shortcuts"));
    assert!(help.contains("Toggle this help screen"));
}

#[test]
fn test_no_color_renders_default_foreground() {
    let sink = draw(
        &populated_store(),
        UiState::default(),
        RunState::Running,
        Theme::new(false),
    );
    let buffer = sink.terminal().backend().buffer();
    assert!(buffer.content.iter().all(|cell| cell.fg == Color::Reset));

    let colored = draw(
        &populated_store(),
        UiState::default(),
        RunState::Running,
        Theme::new(true),
    );
    let buffer = colored.terminal().backend().buffer();
    assert!(buffer.content.iter().any(|cell| cell.fg != Color::Reset));
}

#[test]
fn test_small_terminal_does_not_panic() {
    let terminal = Terminal::new(TestBackend::new(40, 12)).unwrap();
    let mut sink = TerminalSink::new(terminal);
    let view = DashboardView::build(
        &populated_store(),
        &host(),
        UiState {
            show_help: true,
            ..Default::default()
        },
        RunState::Running,
        Theme::new(true),
        DEFAULT_PROCESS_ROWS,
    );
    sink.draw(&view).unwrap();
}

#[test]
fn test_system_lines_carry_their_own_snapshot_time() {
    let store = StateStore::new();
    let mem_at = Utc.with_ymd_and_hms(2024, 5, 1, 3, 4, 5).unwrap();
    let net_at = Utc.with_ymd_and_hms(2024, 5, 1, 3, 4, 9).unwrap();
    store.write(
        SourceId::Memory,
        Snapshot::at(SourceId::Memory, mem_at).with(os::MEM_USAGE, 40.0),
    );
    store.write(
        SourceId::Network,
        Snapshot::at(SourceId::Network, net_at).with(os::NET_RX_RATE, 100.0),
    );
    // cpu stays disabled
    store.publish_status(healthy(SourceId::Memory));
    store.publish_status(healthy(SourceId::Network));

    let screen = render_running(&store);
    let mem_line = screen.lines().find(|l| l.contains("MEM ")).unwrap();
    assert!(mem_line.contains(&format_snapshot_time(mem_at)), "{}", mem_line);
    let net_line = screen.lines().find(|l| l.contains("NET ")).unwrap();
    assert!(net_line.contains(&format_snapshot_time(net_at)), "{}", net_line);
    assert!(!screen.contains("load "));
}

#[test]
fn test_memory_sort_reaches_idle_processes() {
    let store = StateStore::new();
    let mut processes: Vec<Entity> = (100..140)
        .map(|pid| {
            Entity::new(pid.to_string(), format!("busy{}", pid))
                .with(process::PID, pid as f64)
                .with(process::PROC_CPU, pid as f64 / 10.0)
                .with(process::PROC_MEMORY, 1024.0)
        })
        .collect();
    processes.push(
        Entity::new("7", "bigcache")
            .with(process::PID, 7.0)
            .with(process::PROC_CPU, 0.0)
            .with(process::PROC_MEMORY, 4.0 * 1024.0 * 1024.0 * 1024.0),
    );
    store.write(
        SourceId::Process,
        Snapshot::new(SourceId::Process)
            .with(process::PROCESS_COUNT, processes.len() as f64)
            .with_entities(process::sort_candidates(processes, 5)),
    );
    store.publish_status(healthy(SourceId::Process));

    let by_cpu = DashboardView::build(&store, &host(), UiState::default(), RunState::Running, Theme::new(true), 5);
    assert_eq!(by_cpu.processes.len(), 5);
    assert!(by_cpu.processes.iter().all(|p| p.label != "bigcache"));

    let ui = UiState {
        sort_key: SortKey::Memory,
        ..Default::default()
    };
    let by_memory = DashboardView::build(&store, &host(), ui, RunState::Running, Theme::new(true), 5);
    assert_eq!(by_memory.processes[0].label, "bigcache");

    let screen = screen_text(&draw(&store, ui, RunState::Running, Theme::new(true)));
    assert!(screen.contains("bigcache"));
    assert!(screen.contains("sort: mem↓"));
}

#[test]
fn test_streams_table_shows_configured_names() {
    let store = StateStore::new();
    store.write(
        SourceId::Fps,
        Snapshot::new(SourceId::Fps)
            .with(fps::STREAM_COUNT, 3.0)
            .with_entities(vec![
                Entity::new("1", "Gate")
                    .with(fps::FPS_LATEST, 12.0)
                    .with(fps::STREAM_ANALYZE, 1.0),
                Entity::new("2", "Dock")
                    .with(fps::FPS_LATEST, 0.0)
                    .with(fps::STREAM_ANALYZE, 0.0),
                Entity::new("9", "9").with(fps::FPS_LATEST, 3.0),
            ]),
    );
    store.publish_status(healthy(SourceId::Fps));

    let screen = render_running(&store);
    assert!(screen.contains("Streams (3)"));
    assert!(screen.contains("A/K"));
    assert!(screen.contains("NAME"));

    // Only the right-hand column, where the table sits
    let cells = |line: &str| -> Vec<String> {
        let right: String = line.chars().skip(WIDTH as usize * 35 / 100).collect();
        right.split(['│', ' ']).filter(|t| !t.is_empty()).map(str::to_string).collect()
    };
    let gate = cells(screen.lines().find(|l| l.contains("Gate")).unwrap());
    assert!(gate.contains(&"T".to_string()) && gate.contains(&"12.00".to_string()), "{:?}", gate);
    let lines: Vec<&str> = screen.lines().collect();
    let dock_row = lines.iter().position(|l| l.contains("Dock")).unwrap();
    let dock = cells(lines[dock_row]);
    assert!(dock.contains(&"K".to_string()) && dock.contains(&"0.00".to_string()), "{:?}", dock);
    // Streams without a server configuration follow the configured ones
    let unconfigured = cells(lines[dock_row + 1]);
    assert!(unconfigured.contains(&"-".to_string()), "{:?}", unconfigured);
}
