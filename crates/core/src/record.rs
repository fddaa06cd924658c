// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tracked file records.
//!
//! A [`FileRecord`] identifies a file by its root-relative directory prefix
//! and base name. The two combined form the identity key shared by both sides
//! of a sync session; the absolute root stays local and is never serialized.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Process-unique identifier minted when a record is first observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Mints a fresh random identifier.
    pub fn mint() -> Self {
        RecordId(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classification of a record by the latest diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// Present now, absent from the previous manifest.
    New,
    /// Present in both manifests with different checksums.
    Updated,
    /// Present in the previous manifest only.
    Deleted,
    /// Present in both manifests with the same checksum.
    #[default]
    Unchanged,
}

impl FileState {
    /// Returns the string representation used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::New => "new",
            FileState::Updated => "updated",
            FileState::Deleted => "deleted",
            FileState::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "new" => Ok(FileState::New),
            "updated" => Ok(FileState::Updated),
            "deleted" => Ok(FileState::Deleted),
            "unchanged" => Ok(FileState::Unchanged),
            _ => Err(Error::InvalidState(s.to_string())),
        }
    }
}

/// Transfer direction decided during reconciliation, seen from the announcer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// The announcer should push the file's content.
    Upload,
    /// The announcer should pull the file's content.
    Download,
}

impl Action {
    /// Returns the string representation used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Upload => "upload",
            Action::Download => "download",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "upload" => Ok(Action::Upload),
            "download" => Ok(Action::Download),
            _ => Err(Error::InvalidAction(s.to_string())),
        }
    }
}

/// A tracked filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Base filename.
    pub name: String,
    /// Directory prefix relative to the watched root: `""` for the root
    /// itself, otherwise `/`-separated with a trailing `/`.
    pub path: String,
    /// Absolute root the relative path resolves against. Local only.
    #[serde(skip)]
    pub root: PathBuf,
    /// Lowercase hex MD5 of the whole file.
    #[serde(default)]
    pub checksum: String,
    /// Result of the latest diff. Local only.
    #[serde(skip)]
    pub state: FileState,
    /// Decided transfer direction, `""` on the wire when unset.
    #[serde(default, with = "action_wire")]
    pub action: Option<Action>,
    /// Identifier used to correlate announcements with transfers.
    pub id: RecordId,
}

impl FileRecord {
    /// Creates a record with a freshly minted id and no checksum.
    pub fn new(root: impl Into<PathBuf>, path: impl Into<String>, name: impl Into<String>) -> Self {
        FileRecord {
            name: name.into(),
            path: path.into(),
            root: root.into(),
            checksum: String::new(),
            state: FileState::Unchanged,
            action: None,
            id: RecordId::mint(),
        }
    }

    /// Builds a record from a path relative to `root`.
    ///
    /// Returns `None` for paths with no file name component.
    pub fn from_relative(root: &Path, relative: &Path) -> Option<Self> {
        let name = relative.file_name()?.to_string_lossy().into_owned();
        let mut path = String::new();
        if let Some(parent) = relative.parent() {
            for component in parent.components() {
                path.push_str(&component.as_os_str().to_string_lossy());
                path.push('/');
            }
        }
        Some(FileRecord::new(root, path, name))
    }

    /// Returns the identity key: directory prefix plus file name.
    pub fn key(&self) -> String {
        format!("{}{}", self.path, self.name)
    }

    /// Returns a copy with the given action set.
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Returns a copy with the given state set.
    pub fn with_state(mut self, state: FileState) -> Self {
        self.state = state;
        self
    }

    /// Resolves this record against its own root.
    pub fn local_path(&self) -> Result<PathBuf> {
        self.path_in(&self.root)
    }

    /// Resolves this record against `root`.
    ///
    /// Rejects names and prefixes that could escape the root, since records
    /// announced by a peer are untrusted.
    pub fn path_in(&self, root: &Path) -> Result<PathBuf> {
        resolve(root, &self.path, &self.name)
    }

    /// Recomputes the checksum from the file on disk.
    pub fn compute_checksum(&mut self) -> Result<()> {
        let path = self.local_path()?;
        self.checksum = checksum_file(&path)?;
        Ok(())
    }
}

/// Resolves a `(path, name)` pair under `root`, refusing traversal.
pub(crate) fn resolve(root: &Path, path: &str, name: &str) -> Result<PathBuf> {
    let invalid = || Error::InvalidPath(format!("{}{}", path, name));
    if name.is_empty() || name.contains('/') {
        return Err(invalid());
    }

    let mut full = root.to_path_buf();
    let segments = path.split('/').filter(|s| !s.is_empty());
    for segment in segments.chain(std::iter::once(name)) {
        if segment == "." || segment == ".." || segment.contains('\\') || segment.contains(':') {
            return Err(invalid());
        }
        full.push(segment);
    }
    Ok(full)
}

/// Computes the lowercase hex MD5 digest of a file's content.
pub fn checksum_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Computes the lowercase hex MD5 digest of an in-memory buffer.
pub fn checksum_bytes(content: &[u8]) -> String {
    hex::encode(Md5::digest(content))
}

/// Wire encoding for the optional action field.
mod action_wire {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Action;

    pub fn serialize<S: Serializer>(action: &Option<Action>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(action.map(|a| a.as_str()).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Action>, D::Error> {
        let raw = String::deserialize(d)?;
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
