// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Test server utilities and connection tests.
//!
//! Provides a TestServer that runs on a random port over a temporary
//! directory, and exercises the protocol through a real WebSocket client.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use sb_core::{Action, Command, FileRecord, Message, RecordId, TransferFrame};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::server::{self, AcceptFuture, Acceptor, Reply, Session};
use crate::state::ServerState;

const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

/// A test server that runs on a random port and can be controlled.
pub struct TestServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    state: ServerState,
    /// Keep the temp directory alive for the lifetime of the test server.
    temp_dir: tempfile::TempDir,
}

impl TestServer {
    /// Start a new test server over a directory holding `files`.
    pub async fn start(files: &[(&str, &str)]) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            std::fs::write(temp_dir.path().join(path), content).unwrap();
        }
        let state = ServerState::new(temp_dir.path(), Duration::from_secs(3600)).unwrap();

        // Bind to port 0 to get a random available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();

        tokio::spawn(server::serve(listener, state.clone(), cancel.clone()));

        TestServer {
            addr,
            cancel,
            state,
            temp_dir,
        }
    }

    /// Get the WebSocket URL for connecting to this server.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get access to the server state for verification.
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Shutdown the test server.
    pub fn shutdown(self) {
        self.cancel.cancel();
    }
}

/// Fails its first `failures` accepts, then hands out real connections.
struct FlakyListener {
    inner: TcpListener,
    failures: AtomicUsize,
}

impl Acceptor for FlakyListener {
    fn accept(&self) -> AcceptFuture<'_> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Box::pin(std::future::ready(Err(io::Error::other(
                "too many open files",
            ))));
        }
        Box::pin(self.inner.accept())
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A raw protocol client.
struct Peer {
    sink: SplitSink<Socket, tungstenite::Message>,
    stream: SplitStream<Socket>,
}

impl Peer {
    async fn connect(server: &TestServer) -> Self {
        let (ws, _) = connect_async(server.ws_url()).await.unwrap();
        let (sink, stream) = ws.split();
        Peer { sink, stream }
    }

    async fn send(&mut self, msg: &Message) {
        self.send_text(&msg.to_json().unwrap()).await;
    }

    async fn send_text(&mut self, text: &str) {
        self.sink
            .send(tungstenite::Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    async fn send_frame(&mut self, frame: &TransferFrame) {
        self.sink
            .send(tungstenite::Message::Binary(frame.encode().unwrap().into()))
            .await
            .unwrap();
    }

    async fn next(&mut self) -> tungstenite::Message {
        match timeout(Duration::from_secs(5), self.stream.next()).await {
            Ok(Some(Ok(msg))) => msg,
            other => panic!("expected a message, got {:?}", other),
        }
    }

    async fn next_message(&mut self) -> Message {
        match self.next().await {
            tungstenite::Message::Text(text) => Message::from_json(text.as_str()).unwrap(),
            other => panic!("expected a control message, got {:?}", other),
        }
    }

    async fn next_frame(&mut self) -> TransferFrame {
        match self.next().await {
            tungstenite::Message::Binary(data) => TransferFrame::decode(&data).unwrap(),
            other => panic!("expected a transfer, got {:?}", other),
        }
    }
}

fn announced(name: &str, content: &str) -> FileRecord {
    let mut record = FileRecord::new("", "", name);
    record.checksum = sb_core::record::checksum_bytes(content.as_bytes());
    record
}

fn summary(msg: &Message) -> Vec<(String, Option<Action>)> {
    msg.files.iter().map(|f| (f.key(), f.action)).collect()
}

fn peer_addr() -> SocketAddr {
    "127.0.0.1:9".parse().unwrap()
}

async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test]
async fn test_server_starts() {
    let server = TestServer::start(&[]).await;
    assert!(server.addr.port() > 0);
    assert!(server.state().watcher().is_empty());
    server.shutdown();
}

#[tokio::test]
async fn accept_errors_do_not_stop_the_server() {
    let temp = tempfile::tempdir().unwrap();
    let state = ServerState::new(temp.path(), Duration::from_secs(3600)).unwrap();
    let inner = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = inner.local_addr().unwrap();
    let listener = FlakyListener {
        inner,
        failures: AtomicUsize::new(3),
    };
    let cancel = CancellationToken::new();
    let serving = tokio::spawn(server::serve(listener, state, cancel.clone()));

    let (ws, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();
    let (sink, stream) = ws.split();
    let mut peer = Peer { sink, stream };
    peer.send(&Message::syn(Vec::new())).await;

    assert_eq!(peer.next_message().await.command, Command::Ack);
    assert!(!serving.is_finished());
    cancel.cancel();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn syn_is_answered_with_actions() {
    let server = TestServer::start(&[("a.txt", "hello"), ("b.txt", "server")]).await;
    let mut peer = Peer::connect(&server).await;

    peer.send(&Message::syn(vec![announced("a.txt", "hello"), announced("c.txt", "x")]))
        .await;
    let ack = peer.next_message().await;

    assert_eq!(ack.command, Command::Ack);
    assert_eq!(
        summary(&ack),
        vec![
            ("c.txt".to_string(), Some(Action::Upload)),
            ("b.txt".to_string(), Some(Action::Download)),
        ]
    );
    server.shutdown();
}

#[tokio::test]
async fn empty_syn_against_empty_root_gets_empty_ack() {
    let server = TestServer::start(&[]).await;
    let mut peer = Peer::connect(&server).await;

    peer.send(&Message::syn(Vec::new())).await;
    let ack = peer.next_message().await;

    assert_eq!(ack.command, Command::Ack);
    assert!(ack.files.is_empty());
    server.shutdown();
}

#[tokio::test]
async fn upload_is_written_and_tracked() {
    let server = TestServer::start(&[]).await;
    let mut peer = Peer::connect(&server).await;
    let record = announced("a.txt", "hello");

    peer.send(&Message::syn(vec![record.clone()])).await;
    let ack = peer.next_message().await;
    peer.send_frame(&TransferFrame::new(&ack.files[0], b"hello".to_vec()))
        .await;

    let path = server.root().join("a.txt");
    assert!(eventually(|| server.state().watcher().get("a.txt").is_some()).await);
    assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    let tracked = server.state().watcher().get("a.txt").unwrap();
    assert_eq!(tracked.checksum, HELLO_MD5);
    assert_eq!(tracked.id, record.id);
    server.shutdown();
}

#[tokio::test]
async fn pull_is_answered_with_content() {
    let server = TestServer::start(&[("b.txt", "hello")]).await;
    let mut peer = Peer::connect(&server).await;

    peer.send(&Message::syn(Vec::new())).await;
    let ack = peer.next_message().await;
    let download = ack.files[0].clone();
    peer.send(&Message::pull(vec![download.clone()])).await;
    let frame = peer.next_frame().await;

    assert_eq!(frame.key(), "b.txt");
    assert_eq!(frame.content, b"hello");
    assert_eq!(frame.header.id, download.id);
    assert_eq!(frame.header.checksum, HELLO_MD5);
    server.shutdown();
}

#[tokio::test]
async fn malformed_message_keeps_connection() {
    let server = TestServer::start(&[]).await;
    let mut peer = Peer::connect(&server).await;

    peer.send_text("not json").await;
    peer.send_text(r#"{"command":"fin"}"#).await;
    peer.send(&Message::syn(Vec::new())).await;

    assert_eq!(peer.next_message().await.command, Command::Ack);
    server.shutdown();
}

#[tokio::test]
async fn uncorrelated_pull_is_ignored() {
    let server = TestServer::start(&[("b.txt", "hello")]).await;
    let mut peer = Peer::connect(&server).await;
    let stranger = FileRecord::new("", "", "b.txt");

    peer.send(&Message::pull(vec![stranger])).await;
    peer.send(&Message::syn(Vec::new())).await;

    // No transfer precedes the ack
    assert_eq!(peer.next_message().await.command, Command::Ack);
    server.shutdown();
}

#[tokio::test]
async fn ping_gets_pong() {
    let server = TestServer::start(&[]).await;
    let mut peer = Peer::connect(&server).await;

    peer.sink
        .send(tungstenite::Message::Ping(b"beat".to_vec().into()))
        .await
        .unwrap();

    match peer.next().await {
        tungstenite::Message::Pong(data) => assert_eq!(&data[..], b"beat"),
        other => panic!("expected pong, got {:?}", other),
    }
    server.shutdown();
}

#[tokio::test]
async fn connections_have_separate_pending_actions() {
    let server = TestServer::start(&[]).await;
    let mut first = Peer::connect(&server).await;
    let mut second = Peer::connect(&server).await;
    let record = announced("a.txt", "hello");

    first.send(&Message::syn(vec![record.clone()])).await;
    first.next_message().await;

    // The upload was decided for the first connection only
    second
        .send_frame(&TransferFrame::new(&record, b"hijack".to_vec()))
        .await;
    second.send(&Message::syn(Vec::new())).await;
    second.next_message().await;

    assert!(!server.root().join("a.txt").exists());
    server.shutdown();
}

#[tokio::test]
async fn session_rejects_transfer_in_wrong_direction() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("b.txt"), "hello").unwrap();
    let state = ServerState::new(temp.path(), Duration::from_secs(3600)).unwrap();
    let session = Session::new(peer_addr(), state);

    let replies = session
        .handle_text(&Message::syn(Vec::new()).to_json().unwrap())
        .await;
    let Some(Reply::Control(ack)) = replies.into_iter().next() else {
        panic!("expected an ack");
    };

    // b.txt is pending as a download, so an upload of it is a desync
    let frame = TransferFrame::new(&ack.files[0], b"overwrite".to_vec());
    let err = session
        .handle_transfer(&frame.encode().unwrap())
        .await
        .unwrap_err();

    assert!(err.is_desync());
    assert!(session.pending().contains("b.txt"));
    assert_eq!(std::fs::read(temp.path().join("b.txt")).unwrap(), b"hello");
}

#[tokio::test]
async fn session_rejects_stale_upload_id() {
    let temp = tempfile::tempdir().unwrap();
    let state = ServerState::new(temp.path(), Duration::from_secs(3600)).unwrap();
    let session = Session::new(peer_addr(), state);
    let record = announced("a.txt", "hello");
    session
        .handle_text(&Message::syn(vec![record.clone()]).to_json().unwrap())
        .await;

    let mut stale = record.clone();
    stale.id = RecordId::from("previous-round");
    let err = session
        .handle_transfer(&TransferFrame::new(&stale, b"hello".to_vec()).encode().unwrap())
        .await
        .unwrap_err();

    assert!(err.is_desync());
    assert!(!temp.path().join("a.txt").exists());
}

#[tokio::test]
async fn session_drops_garbage_transfer() {
    let temp = tempfile::tempdir().unwrap();
    let state = ServerState::new(temp.path(), Duration::from_secs(3600)).unwrap();
    let session = Session::new(peer_addr(), state);

    let err = session.handle_transfer(&[1, 2]).await.unwrap_err();

    assert!(!err.is_desync());
}

#[test]
fn state_requires_existing_root() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("missing");

    let result = ServerState::new(&missing, Duration::from_secs(1));

    assert!(matches!(result, Err(sb_core::Error::RootMissing(_))));
}

#[test]
fn connection_ids_increase() {
    let temp = tempfile::tempdir().unwrap();
    let state = ServerState::new(temp.path(), Duration::from_secs(1)).unwrap();
    let first = state.next_connection_id();
    assert_eq!(state.next_connection_id(), first + 1);
}
