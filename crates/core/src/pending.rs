// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Pending action correlator.
//!
//! Bridges control-plane decisions to data-plane transfers. Every decided
//! action is registered here and consumed exactly once when its transfer
//! arrives. Transfers that carry their identity key are matched by key
//! ([`PendingActions::fulfill`]); the positional [`PendingActions::match_next`]
//! remains for transfers that carry none.
//!
//! A transfer that matches nothing, or matches in the wrong direction or with
//! the wrong id, is a [`CorrelationError`]: a protocol logic bug, not an I/O
//! fault.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::record::{Action, FileRecord, RecordId};

/// Failure to pair a transfer with a decided action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    /// A transfer arrived for a key with no pending action.
    #[error("no pending action for {key}")]
    Unexpected { key: String },

    /// A positional match was requested with nothing queued.
    #[error("no pending actions")]
    Empty,

    /// A transfer arrived in the opposite direction to the decided one.
    #[error("transfer for {key} arrived as {actual}, expected {expected}")]
    DirectionMismatch {
        key: String,
        expected: Action,
        actual: Action,
    },

    /// A transfer carries a different record id than the decided one.
    #[error("transfer for {key} carries id {actual}, expected {expected}")]
    IdMismatch {
        key: String,
        expected: RecordId,
        actual: RecordId,
    },
}

/// A decided action awaiting its transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    /// The record the action was decided for.
    pub record: FileRecord,
    /// The direction the transfer is expected to move in.
    pub direction: Action,
}

#[derive(Debug, Default)]
struct Queue {
    next_seq: u64,
    by_key: HashMap<String, (u64, PendingAction)>,
    order: BTreeMap<u64, String>,
}

impl Queue {
    fn take(&mut self, key: &str) -> Option<PendingAction> {
        let (seq, action) = self.by_key.remove(key)?;
        self.order.remove(&seq);
        Some(action)
    }
}

/// Identity-keyed registry of pending actions, oldest first.
#[derive(Debug, Default)]
pub struct PendingActions {
    queue: Mutex<Queue>,
}

impl PendingActions {
    /// Creates an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers an action for `record`.
    ///
    /// A newer round supersedes an older one: if the key already has a
    /// pending action it is replaced and returned.
    pub fn enqueue(&self, record: FileRecord, direction: Action) -> Option<PendingAction> {
        let key = record.key();
        let mut queue = self.queue();
        let replaced = queue.take(&key);

        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.order.insert(seq, key.clone());
        queue.by_key.insert(key, (seq, PendingAction { record, direction }));
        replaced
    }

    /// Registers every record that carries an action, in order.
    ///
    /// Returns the number of actions registered.
    pub fn enqueue_all<'a>(&self, records: impl IntoIterator<Item = &'a FileRecord>) -> usize {
        let mut count = 0;
        for record in records {
            if let Some(direction) = record.action {
                self.enqueue(record.clone(), direction);
                count += 1;
            }
        }
        count
    }

    /// Consumes the action pending for `key`.
    ///
    /// On a direction or id mismatch the pending action is left in place.
    pub fn fulfill(
        &self,
        key: &str,
        direction: Action,
        id: Option<&RecordId>,
    ) -> Result<PendingAction, CorrelationError> {
        let mut queue = self.queue();
        let Some((_, pending)) = queue.by_key.get(key) else {
            return Err(CorrelationError::Unexpected {
                key: key.to_string(),
            });
        };

        if pending.direction != direction {
            return Err(CorrelationError::DirectionMismatch {
                key: key.to_string(),
                expected: pending.direction,
                actual: direction,
            });
        }
        if let Some(id) = id {
            if *id != pending.record.id {
                return Err(CorrelationError::IdMismatch {
                    key: key.to_string(),
                    expected: pending.record.id.clone(),
                    actual: id.clone(),
                });
            }
        }

        queue.take(key).ok_or(CorrelationError::Unexpected {
            key: key.to_string(),
        })
    }

    /// Consumes the oldest pending action.
    pub fn match_next(&self) -> Result<PendingAction, CorrelationError> {
        let mut queue = self.queue();
        let key = match queue.order.first_key_value() {
            Some((_, key)) => key.clone(),
            None => return Err(CorrelationError::Empty),
        };
        queue.take(&key).ok_or(CorrelationError::Empty)
    }

    /// Returns true if an action is pending for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.queue().by_key.contains_key(key)
    }

    /// Returns the pending keys, oldest first.
    pub fn keys(&self) -> Vec<String> {
        self.queue().order.values().cloned().collect()
    }

    /// Returns the number of pending actions.
    pub fn len(&self) -> usize {
        self.queue().by_key.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every pending action, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut queue = self.queue();
        let dropped = queue.by_key.len();
        queue.by_key.clear();
        queue.order.clear();
        dropped
    }
}

#[cfg(test)]
#[path = "pending_tests.rs"]
mod tests;
