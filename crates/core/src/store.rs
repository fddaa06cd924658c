// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reading and applying file content under a watched root.

use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::protocol::TransferHeader;
use crate::record::{checksum_bytes, resolve, FileRecord, FileState};

/// Reads the full content of `record` resolved under `root`.
pub async fn read_content(root: &Path, record: &FileRecord) -> Result<Vec<u8>> {
    let path = record.path_in(root)?;
    Ok(tokio::fs::read(&path).await?)
}

/// Writes received content under `root`, creating parent directories.
///
/// Returns the record to track for the written file. It keeps the id from
/// the transfer header and carries the checksum of the bytes written, which
/// may differ from the announced one if the sender's file changed in flight.
pub async fn write_content(
    root: &Path,
    header: &TransferHeader,
    content: &[u8],
) -> Result<FileRecord> {
    let path = resolve(root, &header.path, &header.name)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, content).await?;
    debug!("wrote {} bytes to {}", content.len(), path.display());

    let mut record = FileRecord::new(root, header.path.clone(), header.name.clone())
        .with_state(FileState::Unchanged);
    record.id = header.id.clone();
    record.checksum = checksum_bytes(content);
    Ok(record)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
