mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};
use crate::commands::{check, compact, delve, index, search};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let format = cli.format;

    match cli.command {
        Command::Delve(cmd) => delve::run(cmd, format),
        Command::Search(cmd) => search::run(cmd, format),
        Command::Index(cmd) => index::run(cmd, format),
        Command::Compact(cmd) => compact::run(cmd, format),
        Command::Check(cmd) => check::run(cmd, format),
    }
}
