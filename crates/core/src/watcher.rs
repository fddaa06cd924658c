// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Polling directory watcher.
//!
//! The watcher owns one side's [`Manifest`]. Each scan walks the root without
//! holding the manifest lock, then takes the lock once to diff against the
//! current manifest and replace it. Scans run one at a time. Records applied
//! through [`FileWatcher::set`] while a walk is in progress are carried into
//! the walked manifest, so applied content is never reported as deleted.
//! Subscribers hear about non-empty change sets after the lock is released.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::events::Subscribers;
use crate::manifest::{ChangeSet, Manifest};
use crate::reconcile::reconcile;
use crate::record::FileRecord;

/// Default interval between scans.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Watches a directory tree by rescanning it on a fixed interval.
pub struct FileWatcher {
    root: PathBuf,
    interval: Duration,
    state: Mutex<Tracked>,
    scanning: Mutex<()>,
    changes: Subscribers<ChangeSet>,
}

#[derive(Debug, Default)]
struct Tracked {
    manifest: Manifest,
    /// Records set since the current walk started; `None` between walks.
    applied: Option<Vec<FileRecord>>,
}

impl FileWatcher {
    /// Creates a watcher for `root`.
    ///
    /// Fails with [`Error::RootMissing`] if `root` is not an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::RootMissing(root.to_path_buf()));
        }
        let root = root.canonicalize()?;

        Ok(FileWatcher {
            root,
            interval: DEFAULT_SCAN_INTERVAL,
            state: Mutex::new(Tracked::default()),
            scanning: Mutex::new(()),
            changes: Subscribers::new(),
        })
    }

    /// Sets the interval between scans.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Returns the absolute watched root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the interval between scans.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Registers a callback for non-empty change sets.
    pub fn on_change(&self, callback: impl Fn(&ChangeSet) + Send + Sync + 'static) {
        self.changes.subscribe(callback);
    }

    fn state(&self) -> MutexGuard<'_, Tracked> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Scans the root once and returns the classified change set.
    ///
    /// Blocking: walks the tree and hashes every file.
    pub fn scan(&self) -> Result<ChangeSet> {
        let _scanning = self.scanning.lock().unwrap_or_else(|e| e.into_inner());
        let previous = self.begin_walk();
        let walked = Manifest::scan(&self.root, &previous);
        self.finish_walk(walked)
    }

    /// Snapshots the manifest and starts recording applied records.
    fn begin_walk(&self) -> Manifest {
        let mut state = self.state();
        state.applied = Some(Vec::new());
        state.manifest.clone()
    }

    /// Folds records applied during the walk into `walked`, then diffs it
    /// against the current manifest and replaces it.
    fn finish_walk(&self, walked: Result<Manifest>) -> Result<ChangeSet> {
        let changes = {
            let mut state = self.state();
            let applied = state.applied.take().unwrap_or_default();
            let mut fresh = walked?;
            for record in applied {
                fresh.insert(record);
            }
            let changes = state.manifest.diff(&fresh);
            state.manifest = fresh;
            changes
        };

        if !changes.is_empty() {
            debug!("{} change(s) under {}", changes.len(), self.root.display());
            self.changes.emit(&changes);
        }
        Ok(changes)
    }

    /// Scans immediately, then on every interval tick until `cancel` fires.
    ///
    /// Scan failures are logged and retried on the next tick.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("watcher for {} stopped", self.root.display());
                    return;
                }
                _ = ticker.tick() => {
                    let watcher = Arc::clone(&self);
                    match tokio::task::spawn_blocking(move || watcher.scan()).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!("scan of {} failed: {}", self.root.display(), e),
                        Err(e) => error!("scan task for {} failed: {}", self.root.display(), e),
                    }
                }
            }
        }
    }

    /// Returns every tracked record, sorted by identity key.
    pub fn snapshot(&self) -> Vec<FileRecord> {
        self.state().manifest.records()
    }

    /// Looks up a tracked record by identity key.
    pub fn get(&self, key: &str) -> Option<FileRecord> {
        self.state().manifest.get(key).cloned()
    }

    /// Records applied content so the next scan sees it as unchanged.
    pub fn set(&self, record: FileRecord) {
        let mut state = self.state();
        if let Some(applied) = state.applied.as_mut() {
            applied.push(record.clone());
        }
        state.manifest.insert(record);
    }

    /// Returns the number of tracked records.
    pub fn len(&self) -> usize {
        self.state().manifest.len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decides the action list for a peer's announced records.
    pub fn compare(&self, announced: &[FileRecord]) -> Vec<FileRecord> {
        reconcile(announced, &self.state().manifest)
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
