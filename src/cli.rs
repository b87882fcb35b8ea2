use clap::{Arg, ArgAction, Command};

use crate::core::parse_source_list;

/// Build the command-line interface.
///
/// Flags that mirror configuration fields carry no clap default, so an
/// absent flag leaves the configuration file value in place.
pub fn build_cli() -> Command {
    Command::new("xtop")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Terminal monitor for FPS, system, process and container usage")
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("MS")
                .help("Poll interval in milliseconds, applied to every source")
                .value_parser(clap::value_parser!(u64).range(1..))
        )
        .arg(
            Arg::new("sources")
                .short('s')
                .long("sources")
                .value_name("LIST")
                .help("Comma-separated sources to enable: cpu,mem,disk,net,proc,docker,fps")
                .value_parser(parse_source_list)
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Render without colors")
                .action(ArgAction::SetTrue)
        )
        .arg(
            Arg::new("frame-interval")
                .long("frame-interval")
                .value_name("MS")
                .help("Redraw interval in milliseconds (default: 250)")
                .value_parser(clap::value_parser!(u64).range(1..))
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("MS")
                .help("Per-fetch timeout in milliseconds (default: 2000)")
                .value_parser(clap::value_parser!(u64).range(1..))
        )
        .arg(
            Arg::new("history")
                .long("history")
                .value_name("N")
                .help("Samples kept per source for trend charts (default: 60)")
                .value_parser(clap::value_parser!(usize))
        )
        .arg(
            Arg::new("top")
                .long("top")
                .value_name("N")
                .help("Process rows to collect (default: 20)")
                .value_parser(clap::value_parser!(usize))
        )
        .arg(
            Arg::new("docker-socket")
                .long("docker-socket")
                .value_name("PATH")
                .help("Docker daemon socket (default: $DOCKER_HOST or /var/run/docker.sock)")
                .value_parser(clap::value_parser!(std::path::PathBuf))
        )
        .arg(
            Arg::new("fps-url")
                .long("fps-url")
                .value_name("URL")
                .help("HTTP endpoint streaming newline-delimited stream statuses")
        )
        .arg(
            Arg::new("fps-file")
                .long("fps-file")
                .value_name("PATH")
                .help("Log file of frame timestamps to tail")
                .value_parser(clap::value_parser!(std::path::PathBuf))
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Configuration file (default: <config dir>/xtop/config.json)")
                .value_parser(clap::value_parser!(std::path::PathBuf))
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("PATH")
                .help("Log file (default: <cache dir>/xtop/xtop.log)")
                .value_parser(clap::value_parser!(std::path::PathBuf))
        )
}
