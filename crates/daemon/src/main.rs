// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! mapd — coordination daemon for a fleet of terminal-hosted AI coding
//! agents.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mapd_daemon::config::Config;
use mapd_daemon::lifecycle;
use mapd_daemon::multiplexer::MultiplexerKind;

#[derive(Debug, Parser)]
#[command(name = "mapd", about = "Agent fleet coordination daemon", version)]
struct Cli {
    /// Path of the Unix socket to listen on.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Data directory for the store and worktrees.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Terminal multiplexer hosting agent sessions (tmux or zellij).
    #[arg(long, value_parser = parse_multiplexer)]
    multiplexer: Option<MultiplexerKind>,
}

fn parse_multiplexer(value: &str) -> Result<MultiplexerKind, String> {
    MultiplexerKind::parse(value).ok_or_else(|| format!("unknown multiplexer: {value}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::new(cli.socket, cli.data_dir, cli.multiplexer);

    let daemon = match lifecycle::startup(config).await {
        Ok(daemon) => daemon,
        Err(err) => {
            eprintln!("mapd startup failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = daemon.run().await {
        eprintln!("mapd exited with error: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
