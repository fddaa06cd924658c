// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for sb-core operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::pending::CorrelationError;

/// All possible errors that can occur in sb-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("watched root does not exist or is not a directory: {}", .0.display())]
    RootMissing(PathBuf),

    #[error("invalid action: '{0}'\n  hint: valid actions are: upload, download")]
    InvalidAction(String),

    #[error("invalid file state: '{0}'")]
    InvalidState(String),

    #[error("invalid record path: '{0}'")]
    InvalidPath(String),

    #[error("invalid transfer frame: {0}")]
    InvalidFrame(String),

    #[error("protocol desync: {0}")]
    Correlation(#[from] CorrelationError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this error indicates a protocol logic bug rather than
    /// an environment fault.
    pub fn is_desync(&self) -> bool {
        matches!(self, Error::Correlation(_))
    }
}

/// A specialized Result type for sb-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
