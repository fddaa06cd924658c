// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! syncbox - keeps a local directory in sync with a `syncboxd` server.
//!
//! # Main Components
//!
//! - [`transport::ResilientClient`] - persistent WebSocket connection with
//!   reconnect, backoff, keepalive, and probing
//! - [`SyncClient`] - announces the local manifest and carries out the
//!   server's decisions
//! - [`ClientSettings`] - TOML configuration
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sb_core::FileWatcher;
//! use syncbox::{ClientSettings, ResilientClient, SyncClient};
//!
//! let settings = ClientSettings::default();
//! let cancel = CancellationToken::new();
//! let watcher = Arc::new(FileWatcher::new("./shared")?.with_interval(settings.scan_interval()));
//! let transport = ResilientClient::websocket(&settings.url, settings.client_config(), &cancel);
//! SyncClient::new(watcher, transport).run(cancel).await?;
//! ```

pub mod config;
pub mod error;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod test_helpers;

pub use config::ClientSettings;
pub use error::{Error, Result};
pub use sync::{RoundPhase, SyncClient, DEFAULT_ROUND_TIMEOUT};
pub use transport::{ClientConfig, ConnectionStatus, ResilientClient, TransportError};
