use std::process::ExitCode;

use clap::Parser;
use duet_transport::Shutdown;
use tracing::Level;

mod cli;
mod commands;
mod config;
mod output;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = cli::Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let shutdown = Shutdown::new();
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, closing sessions");
            interrupt.trigger();
        }
    });

    commands::run_command(cli, shutdown).await
}
