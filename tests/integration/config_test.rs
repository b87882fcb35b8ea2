use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use xtop::cli::build_cli;
use xtop::commands::monitor::resolve_config;
use xtop::core::SourceId;
use xtop::{Config, XtopError};

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("config.json");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_config_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "sources": ["cpu", "docker"],
            "source_intervals_ms": {"docker": 5000},
            "history_size": 120,
            "docker_socket": "/tmp/docker.sock"
        }"#,
    );

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.sources, vec![SourceId::Cpu, SourceId::Docker]);
    assert_eq!(config.interval_for(SourceId::Docker), Duration::from_secs(5));
    assert_eq!(config.interval_for(SourceId::Cpu), Duration::from_secs(1));
    assert_eq!(config.history_size, 120);
    assert_eq!(config.docker_socket_path(), PathBuf::from("/tmp/docker.sock"));
    // Untouched fields keep their defaults
    assert_eq!(config.frame_interval_ms, 250);
    assert!(config.color);
}

#[test]
fn test_empty_config_file_is_default() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "  \n");
    assert_eq!(Config::load(Some(path.as_path())).unwrap(), Config::default());
}

#[test]
fn test_invalid_config_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{"sources": ["cpu", "gpu"]}"#);
    let err = Config::load(Some(path.as_path())).unwrap_err();
    assert!(matches!(err, XtopError::Config(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_missing_explicit_config_fails() {
    let dir = TempDir::new().unwrap();
    assert!(Config::load(Some(dir.path().join("nope.json").as_path())).is_err());
}

#[test]
fn test_cli_overrides_config_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{"interval_ms": 3000, "source_intervals_ms": {"proc": 4000}, "top_processes": 5}"#,
    );

    let matches = build_cli()
        .try_get_matches_from([
            "xtop",
            "--config",
            path.to_str().unwrap(),
            "--interval=500",
            "--sources=proc,fps",
            "--no-color",
            "--fps-file=/var/log/frames.log",
        ])
        .unwrap();
    let config = resolve_config(&matches).unwrap();

    // --interval wins over every per-source setting
    assert_eq!(config.interval_for(SourceId::Process), Duration::from_millis(500));
    assert_eq!(config.sources, vec![SourceId::Process, SourceId::Fps]);
    assert!(!config.color);
    assert_eq!(config.top_processes, 5);
    assert!(config.fps_feed().is_some());
}

#[test]
fn test_invalid_values_fail_validation() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{"history_size": 0}"#);
    let matches = build_cli()
        .try_get_matches_from(["xtop", "--config", path.to_str().unwrap()])
        .unwrap();
    assert!(matches!(resolve_config(&matches), Err(XtopError::Config(_))));
}
