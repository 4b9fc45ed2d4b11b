// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ward` binary: parse flags, start the daemon, run until interrupted.

mod args;

use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use args::Args;
use ward_daemon::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Usage errors exit 2; runtime failures exit 1.
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ward: {e}");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = run(config).await {
        tracing::error!(error = format!("{e:#}"), "exiting on error");
        eprintln!("ward: {e:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(config: Config) -> anyhow::Result<()> {
    let daemon = ward_daemon::startup(&config)
        .await
        .with_context(|| format!("failed to start {} daemon", config.mode))?;

    tokio::signal::ctrl_c().await.context("interrupt handler failed")?;
    info!("interrupt received");
    daemon.shutdown().await;
    Ok(())
}
