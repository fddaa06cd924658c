// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! sb-core: Shared library for syncbox
//!
//! This crate provides the file records, manifest scanning and diffing,
//! the control and data plane wire formats, reconciliation, and the pending
//! action correlator used by both the `syncbox` client and the `syncboxd`
//! server.

pub mod error;
pub mod events;
pub mod manifest;
pub mod pending;
pub mod protocol;
pub mod reconcile;
pub mod record;
pub mod store;
pub mod watcher;

pub use error::{Error, Result};
pub use events::Subscribers;
pub use manifest::{ChangeSet, Manifest};
pub use pending::{CorrelationError, PendingAction, PendingActions};
pub use protocol::{Command, Message, TransferFrame, TransferHeader};
pub use reconcile::reconcile;
pub use record::{Action, FileRecord, FileState, RecordId};
pub use watcher::FileWatcher;
