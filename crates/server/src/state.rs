// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Server state management.
//!
//! Wraps the watcher that owns the server-side manifest for shared access
//! from every connection.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sb_core::{FileWatcher, Result};

/// Explicit server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory to serve.
    pub root: PathBuf,
    /// Address to bind to.
    pub bind: SocketAddr,
    /// Interval between scans of `root`.
    pub scan_interval: Duration,
}

/// Shared server state.
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<ServerStateInner>,
}

struct ServerStateInner {
    /// Watcher owning the server-side manifest.
    watcher: Arc<FileWatcher>,
    /// Source of per-connection ids for logging.
    next_connection: AtomicU64,
}

impl ServerState {
    /// Creates state for `root`.
    ///
    /// Fails if `root` is not an existing directory. The manifest is filled
    /// by one synchronous scan so the first `syn` sees the current tree.
    pub fn new(root: &Path, scan_interval: Duration) -> Result<Self> {
        let watcher = FileWatcher::new(root)?.with_interval(scan_interval);
        watcher.scan()?;

        Ok(ServerState {
            inner: Arc::new(ServerStateInner {
                watcher: Arc::new(watcher),
                next_connection: AtomicU64::new(1),
            }),
        })
    }

    /// Creates state from a [`ServerConfig`].
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::new(&config.root, config.scan_interval)
    }

    /// Returns the watcher owning the manifest.
    pub fn watcher(&self) -> &Arc<FileWatcher> {
        &self.inner.watcher
    }

    /// Returns the served directory.
    pub fn root(&self) -> &Path {
        self.inner.watcher.root()
    }

    /// Allocates an id for a new connection.
    pub fn next_connection_id(&self) -> u64 {
        self.inner.next_connection.fetch_add(1, Ordering::Relaxed)
    }
}
