// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Directory manifests and change classification.
//!
//! A [`Manifest`] maps identity keys to the last-known [`FileRecord`] of one
//! side. [`Manifest::scan`] builds a fresh manifest from disk and
//! [`Manifest::diff`] classifies the difference between two manifests.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::record::{checksum_file, FileRecord, FileState};

/// Records emitted by a diff: deleted, then updated, then new, each group
/// sorted by identity key.
pub type ChangeSet = Vec<FileRecord>;

/// One side's mapping from identity key to record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    files: HashMap<String, FileRecord>,
}

impl Manifest {
    /// Creates an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tracked files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if no files are tracked.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Returns true if `key` is tracked.
    pub fn contains(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    /// Looks up a record by identity key.
    pub fn get(&self, key: &str) -> Option<&FileRecord> {
        self.files.get(key)
    }

    /// Inserts or replaces the record for its identity key.
    pub fn insert(&mut self, record: FileRecord) -> Option<FileRecord> {
        self.files.insert(record.key(), record)
    }

    /// Removes the record for `key`.
    pub fn remove(&mut self, key: &str) -> Option<FileRecord> {
        self.files.remove(key)
    }

    /// Returns all records sorted by identity key.
    pub fn records(&self) -> Vec<FileRecord> {
        let mut records: Vec<FileRecord> = self.files.values().cloned().collect();
        records.sort_by_key(FileRecord::key);
        records
    }

    /// Walks `root` and builds a fresh manifest.
    ///
    /// Symlinks are not followed; a symlink to a directory is skipped.
    /// Records already known in `previous` keep their id. A file that cannot
    /// be hashed keeps its previous record when there is one and is skipped
    /// otherwise, so a transient read failure is never reported as a deletion.
    pub fn scan(root: &Path, previous: &Manifest) -> Result<Manifest> {
        if !root.is_dir() {
            return Err(Error::RootMissing(root.to_path_buf()));
        }

        let mut fresh = Manifest::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("walk error under {}: {}", root.display(), e);
                    continue;
                }
            };
            if entry.file_type().is_dir() || (entry.path_is_symlink() && entry.path().is_dir()) {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let Some(mut record) = FileRecord::from_relative(root, relative) else {
                continue;
            };
            let key = record.key();
            let known = previous.get(&key);

            match checksum_file(entry.path()) {
                Ok(checksum) => {
                    record.checksum = checksum;
                    if let Some(known) = known {
                        record.id = known.id.clone();
                    }
                    fresh.insert(record);
                }
                Err(e) => {
                    warn!("failed to hash {}: {}", entry.path().display(), e);
                    if let Some(known) = known {
                        fresh.insert(known.clone().with_state(FileState::Unchanged));
                    }
                }
            }
        }

        debug!("scanned {} files under {}", fresh.len(), root.display());
        Ok(fresh)
    }

    /// Classifies the change from `self` (previous) to `fresh`.
    ///
    /// Keys present in both with the same checksum are not emitted.
    pub fn diff(&self, fresh: &Manifest) -> ChangeSet {
        let mut deleted = Vec::new();
        let mut updated = Vec::new();
        let mut created = Vec::new();

        for (key, old) in &self.files {
            match fresh.files.get(key) {
                None => deleted.push(old.clone().with_state(FileState::Deleted)),
                Some(new) if new.checksum != old.checksum => {
                    updated.push(new.clone().with_state(FileState::Updated));
                }
                Some(_) => {}
            }
        }
        for (key, new) in &fresh.files {
            if !self.files.contains_key(key) {
                created.push(new.clone().with_state(FileState::New));
            }
        }

        for group in [&mut deleted, &mut updated, &mut created] {
            group.sort_by_key(FileRecord::key);
        }

        deleted.into_iter().chain(updated).chain(created).collect()
    }
}

impl FromIterator<FileRecord> for Manifest {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        let mut manifest = Manifest::new();
        for record in iter {
            manifest.insert(record);
        }
        manifest
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
