// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! syncbox: directory sync client.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sb_core::FileWatcher;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use syncbox::{ClientSettings, ResilientClient, SyncClient};

/// syncbox: keep a directory in sync with a syncboxd server
#[derive(Parser, Debug)]
#[command(name = "syncbox", version)]
#[command(about = "Keep a local directory in sync with a syncboxd server")]
struct Args {
    /// Directory to synchronize
    dir: PathBuf,

    /// Server URL (overrides the config file)
    #[arg(short, long)]
    url: Option<String>,

    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_logging(args.verbose);

    let mut settings = match &args.config {
        Some(path) => ClientSettings::load(path)?,
        None => ClientSettings::default(),
    };
    if let Some(url) = args.url {
        settings.url = url;
        settings.validate()?;
    }

    let watcher = FileWatcher::new(&args.dir)?.with_interval(settings.scan_interval());
    info!("Starting syncbox");
    info!("  Directory: {}", watcher.root().display());
    info!("  Server: {}", settings.url);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupted, shutting down");
                    cancel.cancel();
                }
                Err(e) => error!("failed to listen for ctrl-c: {}", e),
            }
        }
    });

    let transport = ResilientClient::websocket(&settings.url, settings.client_config(), &cancel);
    transport.enable_heartbeat_probe();

    let client =
        SyncClient::new(Arc::new(watcher), transport).with_round_timeout(settings.round_timeout());
    client.run(cancel).await?;
    Ok(())
}
