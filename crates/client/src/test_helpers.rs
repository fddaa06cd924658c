// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers: an in-memory dialer and polling utilities.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::transport::{
    ClientConfig, Dialer, Frame, FrameSink, FrameStream, Link, TransportError, TransportFuture,
    TransportResult,
};

/// Polls `condition` every few milliseconds for up to two seconds.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Client timings short enough for tests, with keepalive disabled.
pub fn fast_config() -> ClientConfig {
    let mut config = ClientConfig {
        read_timeout: Duration::from_secs(10),
        write_timeout: Duration::from_secs(1),
        keepalive_interval: Some(Duration::ZERO),
        probe_grace: Duration::from_millis(20),
        ..ClientConfig::default()
    };
    config.backoff.initial = Duration::from_millis(5);
    config.backoff.max = Duration::from_millis(20);
    config
}

#[derive(Default)]
struct DialerState {
    failures: VecDeque<String>,
    dials: usize,
    latency: Duration,
    remotes: Vec<MockRemote>,
}

/// In-memory [`Dialer`]: every accepted dial creates a [`MockRemote`] the
/// test drives from the server side.
#[derive(Clone, Default)]
pub struct MockDialer {
    state: Arc<Mutex<DialerState>>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` dials fail.
    pub fn fail_next(&self, count: usize) {
        let mut state = self.state.lock().unwrap();
        for i in 0..count {
            state.failures.push_back(format!("refused #{}", i + 1));
        }
    }

    /// Makes every later dial take `latency` before it resolves.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = latency;
    }

    /// Total dials attempted, failed or not.
    pub fn dial_count(&self) -> usize {
        self.state.lock().unwrap().dials
    }

    /// Number of dials that produced a link.
    pub fn link_count(&self) -> usize {
        self.state.lock().unwrap().remotes.len()
    }

    /// Server side of the `index`th accepted link.
    pub fn remote(&self, index: usize) -> MockRemote {
        self.state.lock().unwrap().remotes[index].clone()
    }

    /// Server side of the most recent link.
    pub fn latest(&self) -> MockRemote {
        self.state.lock().unwrap().remotes.last().cloned().unwrap()
    }
}

impl Dialer for MockDialer {
    fn dial(&self) -> TransportFuture<'_, Link> {
        Box::pin(async move {
            let latency = self.state.lock().unwrap().latency;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            let mut state = self.state.lock().unwrap();
            state.dials += 1;
            if let Some(reason) = state.failures.pop_front() {
                return Err(TransportError::ConnectionFailed(reason));
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let remote = MockRemote {
                incoming: tx,
                sent: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
            };
            state.remotes.push(remote.clone());

            Ok(Link {
                sink: Box::new(MockSink {
                    sent: Arc::clone(&remote.sent),
                    closed: Arc::clone(&remote.closed),
                }),
                stream: Box::new(MockStream { rx }),
            })
        })
    }
}

/// The far end of one mock link.
#[derive(Clone)]
pub struct MockRemote {
    incoming: mpsc::UnboundedSender<TransportResult<Frame>>,
    sent: Arc<Mutex<Vec<Frame>>>,
    closed: Arc<AtomicBool>,
}

impl MockRemote {
    /// Delivers a frame to the client.
    pub fn push(&self, frame: Frame) {
        let _ = self.incoming.send(Ok(frame));
    }

    pub fn push_text(&self, text: &str) {
        self.push(Frame::Text(text.to_string()));
    }

    /// Makes the client's next read fail.
    pub fn push_error(&self) {
        let _ = self
            .incoming
            .send(Err(TransportError::ReceiveFailed("reset by peer".into())));
    }

    /// Closes the link from the server side.
    pub fn hang_up(&self) {
        let _ = self.incoming.send(Err(TransportError::ConnectionClosed));
    }

    /// Frames the client has written to this link.
    pub fn sent(&self) -> Vec<Frame> {
        self.sent.lock().unwrap().clone()
    }

    /// Text frames the client has written to this link.
    pub fn sent_text(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|f| match f {
                Frame::Text(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Binary frames the client has written to this link.
    pub fn sent_binary(&self) -> Vec<Vec<u8>> {
        self.sent()
            .into_iter()
            .filter_map(|f| match f {
                Frame::Binary(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    /// True once the client closed its write half.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct MockSink {
    sent: Arc<Mutex<Vec<Frame>>>,
    closed: Arc<AtomicBool>,
}

impl FrameSink for MockSink {
    fn send(&mut self, frame: Frame) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.closed.load(Ordering::Acquire) {
                return Err(TransportError::SendFailed("sink closed".into()));
            }
            self.sent.lock().unwrap().push(frame);
            Ok(())
        })
    }

    fn close(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.closed.store(true, Ordering::Release);
            Ok(())
        })
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<TransportResult<Frame>>,
}

impl FrameStream for MockStream {
    fn recv(&mut self) -> TransportFuture<'_, Frame> {
        Box::pin(async move {
            match self.rx.recv().await {
                Some(result) => result,
                None => Err(TransportError::ConnectionClosed),
            }
        })
    }
}
