// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::record::{Action, FileState};
use std::fs;
use tempfile::TempDir;

fn watcher_with(files: &[(&str, &str)]) -> (TempDir, FileWatcher) {
    let temp = TempDir::new().unwrap();
    for (name, content) in files {
        let path = temp.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    let watcher = FileWatcher::new(temp.path()).unwrap();
    (temp, watcher)
}

#[test]
fn new_rejects_missing_root() {
    let temp = TempDir::new().unwrap();
    let result = FileWatcher::new(temp.path().join("nope"));
    assert!(matches!(result, Err(Error::RootMissing(_))));
}

#[test]
fn first_scan_reports_new_file() {
    let (_temp, watcher) = watcher_with(&[("a.txt", "hello")]);

    let changes = watcher.scan().unwrap();

    assert_eq!(changes.len(), 1);
    let record = &changes[0];
    assert_eq!(record.state, FileState::New);
    assert_eq!(record.path, "");
    assert_eq!(record.name, "a.txt");
    assert_eq!(record.checksum, "5d41402abc4b2a76b9719d911017c592");
}

#[test]
fn rescanning_unchanged_tree_is_empty() {
    let (_temp, watcher) = watcher_with(&[("a.txt", "hello"), ("sub/b.txt", "b")]);

    assert_eq!(watcher.scan().unwrap().len(), 2);
    assert!(watcher.scan().unwrap().is_empty());
}

#[test]
fn modification_reports_updated_for_that_key_only() {
    let (temp, watcher) = watcher_with(&[("a.txt", "hello"), ("b.txt", "other")]);
    watcher.scan().unwrap();
    let before = watcher.get("a.txt").unwrap().checksum;

    fs::write(temp.path().join("a.txt"), "hello, world").unwrap();
    let changes = watcher.scan().unwrap();

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].key(), "a.txt");
    assert_eq!(changes[0].state, FileState::Updated);
    assert_ne!(changes[0].checksum, before);
}

#[test]
fn deletion_reports_deleted_and_forgets_key() {
    let (temp, watcher) = watcher_with(&[("a.txt", "hello")]);
    watcher.scan().unwrap();

    fs::remove_file(temp.path().join("a.txt")).unwrap();
    let changes = watcher.scan().unwrap();

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].key(), "a.txt");
    assert_eq!(changes[0].state, FileState::Deleted);
    assert!(watcher.get("a.txt").is_none());
    assert!(watcher.is_empty());
}

#[test]
fn subscribers_receive_non_empty_change_sets_only() {
    let (_temp, watcher) = watcher_with(&[("a.txt", "hello")]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    watcher.on_change(move |changes| sink.lock().unwrap().push(changes.len()));

    watcher.scan().unwrap();
    watcher.scan().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![1]);
}

#[test]
fn set_marks_downloaded_content_as_known() {
    let (temp, watcher) = watcher_with(&[]);
    watcher.scan().unwrap();

    fs::write(temp.path().join("pulled.txt"), "from peer").unwrap();
    let mut record = FileRecord::new(watcher.root(), "", "pulled.txt");
    record.compute_checksum().unwrap();
    watcher.set(record);

    assert!(watcher.scan().unwrap().is_empty());
}

#[test]
fn content_applied_during_a_walk_is_not_reported_deleted() {
    let (temp, watcher) = watcher_with(&[("a.txt", "hello")]);
    watcher.scan().unwrap();

    // The walk completes before the pulled file reaches the disk
    let previous = watcher.begin_walk();
    let walked = Manifest::scan(watcher.root(), &previous);
    fs::write(temp.path().join("pulled.txt"), "from peer").unwrap();
    let mut applied = FileRecord::new(watcher.root(), "", "pulled.txt");
    applied.compute_checksum().unwrap();
    watcher.set(applied.clone());
    let changes = watcher.finish_walk(walked).unwrap();

    assert!(changes.is_empty(), "unexpected changes: {:?}", changes);
    assert_eq!(watcher.get("pulled.txt").unwrap().id, applied.id);
    assert!(watcher.scan().unwrap().is_empty());
}

#[test]
fn compare_uses_current_manifest() {
    let (_temp, watcher) = watcher_with(&[("a.txt", "a"), ("b.txt", "b")]);
    watcher.scan().unwrap();

    let announced = vec![FileRecord::new("/client", "", "a.txt")];
    let actions = watcher.compare(&announced);

    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].key(), "b.txt");
    assert_eq!(actions[0].action, Some(Action::Download));
}

#[tokio::test]
async fn run_scans_immediately_and_stops_on_cancel() {
    let (_temp, watcher) = watcher_with(&[("a.txt", "hello")]);
    let watcher = Arc::new(watcher.with_interval(Duration::from_secs(60)));
    let cancel = CancellationToken::new();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    watcher.on_change(move |changes| {
        let _ = tx.send(changes.len());
    });

    let task = tokio::spawn(Arc::clone(&watcher).run(cancel.clone()));

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(first, Some(1));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}
