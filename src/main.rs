use anyhow::Result;

use xtop::cli::build_cli;
use xtop::commands;

fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    commands::monitor(&matches)
}
