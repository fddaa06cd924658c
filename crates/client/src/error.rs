// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

/// All possible errors that can occur in the syncbox client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid server url '{0}'\n  hint: use ws://host:port/ or wss://host:port/")]
    InvalidUrl(String),

    #[error("sync client is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Core(#[from] sb_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this error indicates a protocol logic bug rather than
    /// an environment fault.
    pub fn is_desync(&self) -> bool {
        matches!(self, Error::Core(e) if e.is_desync())
    }
}

impl From<sb_core::CorrelationError> for Error {
    fn from(e: sb_core::CorrelationError) -> Self {
        Error::Core(e.into())
    }
}

/// A specialized Result type for syncbox client operations.
pub type Result<T> = std::result::Result<T, Error>;
