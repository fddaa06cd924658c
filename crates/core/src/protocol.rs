// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol messages for client-server communication.
//!
//! The control plane is JSON text frames:
//! - Client sends `syn` with its manifest, and `pull` for content it needs
//! - Server answers `syn` with `ack` carrying the decided actions
//!
//! The data plane is binary frames on the same socket, each carrying one
//! file: a big-endian `u32` header length, a JSON [`TransferHeader`], then the
//! raw content.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::{FileRecord, RecordId};

/// Control-plane command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Announce a file set for reconciliation.
    Syn,
    /// Reply to `syn` with the decided actions.
    Ack,
    /// Request content for `download` actions.
    Pull,
}

/// The control-plane wire unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub command: Command,
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

impl Message {
    /// Creates a `syn` message announcing `files`.
    pub fn syn(files: Vec<FileRecord>) -> Self {
        Message {
            command: Command::Syn,
            files,
        }
    }

    /// Creates an `ack` message carrying decided actions.
    pub fn ack(files: Vec<FileRecord>) -> Self {
        Message {
            command: Command::Ack,
            files,
        }
    }

    /// Creates a `pull` message requesting content for `files`.
    pub fn pull(files: Vec<FileRecord>) -> Self {
        Message {
            command: Command::Pull,
            files,
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Self-describing header of a data-plane frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHeader {
    pub id: RecordId,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub checksum: String,
}

impl TransferHeader {
    /// Returns the identity key of the transferred file.
    pub fn key(&self) -> String {
        format!("{}{}", self.path, self.name)
    }
}

impl From<&FileRecord> for TransferHeader {
    fn from(record: &FileRecord) -> Self {
        TransferHeader {
            id: record.id.clone(),
            name: record.name.clone(),
            path: record.path.clone(),
            checksum: record.checksum.clone(),
        }
    }
}

/// One file's content on the data plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFrame {
    pub header: TransferHeader,
    pub content: Vec<u8>,
}

const LEN_PREFIX: usize = 4;

impl TransferFrame {
    /// Creates a frame for `record` carrying `content`.
    pub fn new(record: &FileRecord, content: Vec<u8>) -> Self {
        TransferFrame {
            header: TransferHeader::from(record),
            content,
        }
    }

    /// Returns the identity key of the transferred file.
    pub fn key(&self) -> String {
        self.header.key()
    }

    /// Encodes the frame as `len | header json | content`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = serde_json::to_vec(&self.header)?;
        let len = u32::try_from(header.len())
            .map_err(|_| Error::InvalidFrame("header too large".to_string()))?;

        let mut out = Vec::with_capacity(LEN_PREFIX + header.len() + self.content.len());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.content);
        Ok(out)
    }

    /// Decodes a frame produced by [`TransferFrame::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < LEN_PREFIX {
            return Err(Error::InvalidFrame(format!(
                "frame too short: {} bytes",
                bytes.len()
            )));
        }
        let (prefix, rest) = bytes.split_at(LEN_PREFIX);
        let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if rest.len() < len {
            return Err(Error::InvalidFrame(format!(
                "header length {} exceeds frame of {} bytes",
                len,
                rest.len()
            )));
        }

        let (header, content) = rest.split_at(len);
        Ok(TransferFrame {
            header: serde_json::from_slice(header)?,
            content: content.to_vec(),
        })
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
