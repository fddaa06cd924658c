// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side sync coordinator.
//!
//! Drives one round per announcement:
//!
//! ```text
//! Idle ──syn──► Announced ──ack──► Decided ──► Acting ──all pulls applied──► Idle
//! ```
//!
//! Watcher and transport callbacks only forward events into a channel; a
//! single task consumes them, so scan, announce, and apply stay sequential.
//!
//! At most one round is in flight per connection. The full manifest is
//! announced on (re)connect and on a non-empty change set, but only from
//! `Idle`; changes seen mid-round mark the round dirty and are announced
//! together once it ends. A round that makes no progress for the round
//! timeout is abandoned and announced again.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sb_core::record::checksum_bytes;
use sb_core::{
    store, Action, Command, FileRecord, FileWatcher, Message, PendingActions, TransferFrame,
};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::transport::{Frame, ResilientClient};

/// Phase of the current sync round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundPhase {
    /// No round in flight.
    #[default]
    Idle,
    /// `syn` sent, waiting for `ack`.
    Announced,
    /// `ack` received.
    Decided,
    /// Transfers in flight.
    Acting,
}

/// How long a round may go without progress before it is abandoned.
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Round {
    phase: RoundPhase,
    /// Local changes arrived while the round was in flight.
    dirty: bool,
    /// Last time the round advanced; `None` while idle.
    progressed: Option<Instant>,
}

#[derive(Debug)]
enum SyncEvent {
    Connected,
    Disconnected,
    Changed(usize),
    Frame(Frame),
}

/// Keeps a watched directory in sync with a server.
pub struct SyncClient {
    watcher: Arc<FileWatcher>,
    transport: ResilientClient,
    pending: PendingActions,
    round: Mutex<Round>,
    round_timeout: Duration,
    events: Mutex<Option<mpsc::UnboundedReceiver<SyncEvent>>>,
}

impl SyncClient {
    /// Wires `watcher` and `transport` together.
    ///
    /// Nothing happens until [`SyncClient::run`] is called.
    pub fn new(watcher: Arc<FileWatcher>, transport: ResilientClient) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let events = tx.clone();
        watcher.on_change(move |changes| {
            let _ = events.send(SyncEvent::Changed(changes.len()));
        });
        let events = tx.clone();
        transport.on_connect(move || {
            let _ = events.send(SyncEvent::Connected);
        });
        let events = tx.clone();
        transport.on_disconnect(move || {
            let _ = events.send(SyncEvent::Disconnected);
        });
        transport.on_message(move |frame| {
            let _ = tx.send(SyncEvent::Frame(frame.clone()));
        });

        SyncClient {
            watcher,
            transport,
            pending: PendingActions::new(),
            round: Mutex::new(Round::default()),
            round_timeout: DEFAULT_ROUND_TIMEOUT,
            events: Mutex::new(Some(rx)),
        }
    }

    /// Sets how long a round may stall before it is started over.
    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = timeout;
        self
    }

    pub fn watcher(&self) -> &Arc<FileWatcher> {
        &self.watcher
    }

    pub fn transport(&self) -> &ResilientClient {
        &self.transport
    }

    /// Downloads requested but not yet applied.
    pub fn pending(&self) -> &PendingActions {
        &self.pending
    }

    /// Returns the phase of the current round.
    pub fn phase(&self) -> RoundPhase {
        self.round().phase
    }

    fn round(&self) -> MutexGuard<'_, Round> {
        self.round.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: RoundPhase) {
        let mut round = self.round();
        if round.phase != phase {
            debug!("round phase {:?} -> {:?}", round.phase, phase);
            round.phase = phase;
        }
        round.progressed = match phase {
            RoundPhase::Idle => None,
            _ => Some(Instant::now()),
        };
    }

    fn deadline(&self) -> Option<Instant> {
        self.round().progressed.map(|at| at + self.round_timeout)
    }

    /// Starts the watcher and the transport, then processes events until
    /// `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(Error::AlreadyRunning)?;

        let scan_cancel = cancel.child_token();
        let scan = tokio::spawn(Arc::clone(&self.watcher).run(scan_cancel.clone()));

        if let Err(e) = self.transport.connect().await {
            warn!("initial connect failed: {}, retrying in background", e);
        }

        loop {
            let deadline = self.deadline();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.report(self.expire_round().await);
                }
            }
        }

        self.transport.close().await;
        scan_cancel.cancel();
        if let Err(e) = scan.await {
            error!("watcher task failed: {}", e);
        }
        info!("sync client stopped");
        Ok(())
    }

    async fn handle(&self, event: SyncEvent) {
        let result = match event {
            // A connection that already started a round has nothing new to say
            SyncEvent::Connected if self.phase() != RoundPhase::Idle => Ok(()),
            SyncEvent::Connected => self.announce().await,
            SyncEvent::Changed(count) => {
                debug!("{} local change(s)", count);
                if !self.transport.is_connected() {
                    Ok(())
                } else if self.phase() == RoundPhase::Idle {
                    self.announce().await
                } else {
                    self.round().dirty = true;
                    Ok(())
                }
            }
            SyncEvent::Disconnected => {
                let dropped = self.pending.clear();
                if dropped > 0 {
                    warn!("connection lost with {} download(s) pending", dropped);
                }
                self.set_phase(RoundPhase::Idle);
                self.round().dirty = false;
                Ok(())
            }
            SyncEvent::Frame(Frame::Text(text)) => self.handle_text(&text).await,
            SyncEvent::Frame(Frame::Binary(data)) => self.handle_transfer(&data).await,
            SyncEvent::Frame(_) => Ok(()),
        };
        self.report(result);
    }

    fn report(&self, result: Result<()>) {
        if let Err(e) = result {
            if e.is_desync() {
                error!("{}", e);
            } else {
                warn!("sync step failed: {}", e);
            }
        }
    }

    /// Sends the full current manifest.
    async fn announce(&self) -> Result<()> {
        let files = self.watcher.snapshot();
        let count = files.len();
        self.transport.send_json(&Message::syn(files)).await?;
        debug!("announced {} file(s)", count);
        self.set_phase(RoundPhase::Announced);
        Ok(())
    }

    /// Returns to `Idle`, announcing once more if changes arrived meanwhile.
    async fn finish_round(&self) -> Result<()> {
        self.set_phase(RoundPhase::Idle);
        let dirty = std::mem::take(&mut self.round().dirty);
        if dirty && self.transport.is_connected() {
            self.announce().await
        } else {
            Ok(())
        }
    }

    /// Drops a round that stopped making progress and starts a fresh one.
    async fn expire_round(&self) -> Result<()> {
        let dropped = self.pending.clear();
        warn!(
            "round stalled in {:?} with {} download(s) pending, starting over",
            self.phase(),
            dropped
        );
        self.round().dirty = true;
        self.finish_round().await
    }

    async fn handle_text(&self, text: &str) -> Result<()> {
        let msg = match Message::from_json(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("dropping undecodable message: {}", e);
                return Ok(());
            }
        };

        match msg.command {
            Command::Ack if self.phase() != RoundPhase::Announced => {
                warn!("ignoring ack outside of an announced round");
                Ok(())
            }
            Command::Ack => self.apply(msg.files).await,
            other => {
                warn!("unexpected {:?} from server", other);
                Ok(())
            }
        }
    }

    /// Carries out the actions decided by the server.
    async fn apply(&self, actions: Vec<FileRecord>) -> Result<()> {
        self.set_phase(RoundPhase::Decided);
        info!("server decided {} action(s)", actions.len());
        self.set_phase(RoundPhase::Acting);

        let root = self.watcher.root().to_path_buf();
        let mut pulls = Vec::new();
        for mut record in actions {
            record.root = root.clone();
            match record.action {
                Some(Action::Upload) => {
                    if let Err(e) = self.upload(&record).await {
                        warn!("upload of {} failed: {}", record.key(), e);
                    }
                }
                Some(Action::Download) => {
                    self.pending.enqueue(record.clone(), Action::Download);
                    pulls.push(record);
                }
                None => debug!("no action for {}", record.key()),
            }
        }

        if !pulls.is_empty() {
            self.transport.send_json(&Message::pull(pulls)).await?;
        }
        if self.pending.is_empty() {
            return self.finish_round().await;
        }
        Ok(())
    }

    async fn upload(&self, record: &FileRecord) -> Result<()> {
        let content = store::read_content(self.watcher.root(), record).await?;
        let mut frame = TransferFrame::new(record, content);
        frame.header.checksum = checksum_bytes(&frame.content);

        self.transport.send_binary(frame.encode()?).await?;
        info!("uploaded {} ({} bytes)", record.key(), frame.content.len());
        Ok(())
    }

    /// Applies downloaded content answering an earlier pull.
    async fn handle_transfer(&self, data: &[u8]) -> Result<()> {
        let frame = TransferFrame::decode(data)?;
        let key = frame.key();
        self.pending
            .fulfill(&key, Action::Download, Some(&frame.header.id))?;

        let record =
            store::write_content(self.watcher.root(), &frame.header, &frame.content).await?;
        info!("downloaded {} ({} bytes)", key, frame.content.len());
        self.watcher.set(record);

        if self.pending.is_empty() {
            return self.finish_round().await;
        }
        self.set_phase(RoundPhase::Acting);
        Ok(())
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
