// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciliation of an announced file set against a local manifest.
//!
//! The receiver of a `syn` decides, per identity key, which side must move
//! content. Actions are phrased from the announcer's point of view:
//!
//! - announced but unknown locally: `upload` (the announcer pushes it)
//! - known locally but not announced: `download` (the announcer pulls it)
//!
//! Keys known to both sides produce no action; there is no conflict
//! resolution for content that differs on both sides.

use std::collections::HashSet;

use crate::manifest::Manifest;
use crate::record::{Action, FileRecord};

/// Builds the action list for `announced` against the receiver's `local`
/// manifest.
///
/// Uploads come first, in announced order (duplicate keys collapse to the
/// first occurrence), followed by downloads sorted by identity key. Download
/// records carry the receiver's id so the announcer's pull can be matched.
pub fn reconcile(announced: &[FileRecord], local: &Manifest) -> Vec<FileRecord> {
    let mut seen = HashSet::new();
    let mut actions = Vec::new();

    for file in announced {
        let key = file.key();
        if !seen.insert(key.clone()) {
            continue;
        }
        if !local.contains(&key) {
            actions.push(file.clone().with_action(Action::Upload));
        }
    }

    for file in local.records() {
        if !seen.contains(&file.key()) {
            actions.push(file.with_action(Action::Download));
        }
    }

    actions
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
