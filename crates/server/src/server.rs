// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket server implementation.
//!
//! Each connection gets its own [`Session`] with its own pending actions:
//! - `syn` is reconciled against the server manifest and answered with `ack`
//! - `pull` is answered with one binary transfer per requested file
//! - binary transfers are uploads and are applied under the served root
//!
//! Undecodable messages and uncorrelated transfers are logged and dropped;
//! the connection stays open.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sb_core::record::checksum_bytes;
use sb_core::{store, Action, Command, FileRecord, Message, PendingActions, TransferFrame};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::state::ServerState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Pause after a failed accept before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub(crate) type AcceptFuture<'a> =
    Pin<Box<dyn Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send + 'a>>;

/// Source of incoming TCP connections.
pub(crate) trait Acceptor: Send + Sync {
    fn accept(&self) -> AcceptFuture<'_>;
}

impl Acceptor for TcpListener {
    fn accept(&self) -> AcceptFuture<'_> {
        Box::pin(TcpListener::accept(self))
    }
}

/// Run the WebSocket server on the given address until `cancel` fires.
pub async fn run(
    addr: SocketAddr,
    state: ServerState,
    cancel: CancellationToken,
) -> Result<(), BoxError> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on: {}", listener.local_addr()?);
    serve(listener, state, cancel).await
}

/// Accept connections on `listener` until `cancel` fires.
///
/// Accept errors (descriptor exhaustion, aborted handshakes) are logged and
/// retried after a short pause.
pub(crate) async fn serve(
    listener: impl Acceptor,
    state: ServerState,
    cancel: CancellationToken,
) -> Result<(), BoxError> {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted,
        };
        let (stream, peer_addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("Server shutting down");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => continue,
                }
            }
        };

        let state = state.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state, cancel).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: ServerState,
    cancel: CancellationToken,
) -> Result<(), BoxError> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let session = Session::new(peer_addr, state);
    info!("New WebSocket connection #{} from: {}", session.id, peer_addr);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = ws_sink.close().await;
                break;
            }
            msg = ws_stream.next() => msg,
        };

        match msg {
            Some(Ok(tungstenite::Message::Text(text))) => {
                for reply in session.handle_text(text.as_str()).await {
                    ws_sink.send(reply.into_ws()?).await?;
                }
            }
            Some(Ok(tungstenite::Message::Binary(data))) => {
                if let Err(e) = session.handle_transfer(&data).await {
                    if e.is_desync() {
                        error!("Protocol desync with {}: {}", peer_addr, e);
                    } else {
                        warn!("Dropping transfer from {}: {}", peer_addr, e);
                    }
                }
            }
            Some(Ok(tungstenite::Message::Ping(data))) => {
                ws_sink.send(tungstenite::Message::Pong(data)).await?;
            }
            Some(Ok(tungstenite::Message::Close(_))) => {
                info!("Client {} disconnected", peer_addr);
                break;
            }
            Some(Ok(_)) => {
                // Ignore other message types (Pong, Frame)
            }
            Some(Err(e)) => {
                error!("WebSocket error from {}: {}", peer_addr, e);
                break;
            }
            None => {
                info!("Client {} stream ended", peer_addr);
                break;
            }
        }
    }

    let abandoned = session.pending.clear();
    if abandoned > 0 {
        debug!("Dropped {} pending action(s) for {}", abandoned, peer_addr);
    }
    info!("Connection closed: {}", peer_addr);
    Ok(())
}

/// An outgoing frame produced by a [`Session`].
#[derive(Debug)]
pub(crate) enum Reply {
    Control(Message),
    Transfer(TransferFrame),
}

impl Reply {
    fn into_ws(self) -> Result<tungstenite::Message, BoxError> {
        Ok(match self {
            Reply::Control(msg) => tungstenite::Message::Text(msg.to_json()?.into()),
            Reply::Transfer(frame) => tungstenite::Message::Binary(frame.encode()?.into()),
        })
    }
}

/// Per-connection coordinator state.
pub(crate) struct Session {
    id: u64,
    peer: SocketAddr,
    state: ServerState,
    pending: PendingActions,
}

impl Session {
    pub(crate) fn new(peer: SocketAddr, state: ServerState) -> Self {
        Session {
            id: state.next_connection_id(),
            peer,
            state,
            pending: PendingActions::new(),
        }
    }

    /// Process a control message and return the frames to send back.
    pub(crate) async fn handle_text(&self, text: &str) -> Vec<Reply> {
        let msg = match Message::from_json(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dropping undecodable message from {}: {}", self.peer, e);
                return Vec::new();
            }
        };
        debug!(
            "Received {:?} with {} file(s) from {}",
            msg.command,
            msg.files.len(),
            self.peer
        );

        match msg.command {
            Command::Syn => vec![Reply::Control(self.reconcile(&msg.files))],
            Command::Pull => self.serve_pull(msg.files).await,
            Command::Ack => {
                warn!("Unexpected ack from {}", self.peer);
                Vec::new()
            }
        }
    }

    /// Decides actions for an announced manifest and registers them.
    fn reconcile(&self, announced: &[FileRecord]) -> Message {
        let actions = self.state.watcher().compare(announced);
        let registered = self.pending.enqueue_all(&actions);
        info!(
            "Reconciled {} announced file(s) from {}: {} action(s)",
            announced.len(),
            self.peer,
            registered
        );
        Message::ack(actions)
    }

    /// Answers a pull with one transfer per correlated download.
    async fn serve_pull(&self, files: Vec<FileRecord>) -> Vec<Reply> {
        let mut replies = Vec::with_capacity(files.len());
        for record in files {
            let key = record.key();
            if let Err(e) = self
                .pending
                .fulfill(&key, Action::Download, Some(&record.id))
            {
                error!("Protocol desync with {}: {}", self.peer, e);
                continue;
            }

            match store::read_content(self.state.root(), &record).await {
                Ok(content) => {
                    let mut frame = TransferFrame::new(&record, content);
                    frame.header.checksum = checksum_bytes(&frame.content);
                    debug!("Sending {} ({} bytes)", key, frame.content.len());
                    replies.push(Reply::Transfer(frame));
                }
                Err(e) => warn!("Failed to read {} for {}: {}", key, self.peer, e),
            }
        }
        replies
    }

    /// Applies an uploaded file decided by an earlier `ack`.
    pub(crate) async fn handle_transfer(&self, data: &[u8]) -> sb_core::Result<FileRecord> {
        let frame = TransferFrame::decode(data)?;
        let key = frame.key();
        self.pending
            .fulfill(&key, Action::Upload, Some(&frame.header.id))?;

        let record =
            store::write_content(self.state.root(), &frame.header, &frame.content).await?;
        info!(
            "Received {} from {} ({} bytes)",
            key,
            self.peer,
            frame.content.len()
        );
        self.state.watcher().set(record.clone());
        Ok(record)
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> &PendingActions {
        &self.pending
    }
}
