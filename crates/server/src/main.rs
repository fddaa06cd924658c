// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! syncboxd: WebSocket sync server.
//!
//! Serves one directory. Clients announce their manifests, the server decides
//! who uploads and who downloads, and content moves over the same socket.

mod server;
#[cfg(test)]
mod server_tests;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use state::{ServerConfig, ServerState};

/// syncboxd: directory sync server
#[derive(Parser, Debug)]
#[command(name = "syncboxd", version)]
#[command(about = "WebSocket server keeping client directories in sync with one served directory")]
struct Args {
    /// Directory to serve
    dir: PathBuf,

    /// Address to bind the server to
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Interval between directory scans in milliseconds
    #[arg(long, default_value = "1000")]
    scan_interval_ms: u64,

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
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    setup_logging(args.verbose);

    let config = ServerConfig {
        root: args.dir,
        bind: args.bind,
        scan_interval: Duration::from_millis(args.scan_interval_ms.max(1)),
    };

    info!("Starting syncboxd server");
    info!("  Bind address: {}", config.bind);
    info!("  Directory: {}", config.root.display());

    let state = ServerState::from_config(&config)?;
    info!("  Tracking {} file(s)", state.watcher().len());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupted, shutting down");
                    cancel.cancel();
                }
                Err(e) => error!("Failed to listen for ctrl-c: {}", e),
            }
        }
    });

    let scan = tokio::spawn(Arc::clone(state.watcher()).run(cancel.child_token()));

    let result = server::run(config.bind, state, cancel.clone()).await;
    cancel.cancel();
    let _ = scan.await;
    result
}
