// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent connection that survives an unreliable network.
//!
//! [`ResilientClient::connect`] dials once and starts two background tasks:
//! the listen loop, which reads with a deadline and reconnects with backoff
//! after failures, and the keepalive loop, which pings while connected.
//! Both stop when the governing cancellation token fires or
//! [`ResilientClient::close`] is called.
//!
//! A read failure that is not a clean close first gets one probe (if a probe
//! is configured) and a grace period. A second consecutive failure drops the
//! link and reconnects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sb_core::Subscribers;
use serde::Serialize;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::{Backoff, BackoffConfig};
use super::status::{ConnectionState, ConnectionStatus};
use super::websocket::WebSocketDialer;
use super::{Dialer, Frame, FrameSink, FrameStream, Link, TransportError, TransportResult};

/// Default read deadline.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default write deadline.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait after a probe before reading again.
pub const DEFAULT_PROBE_GRACE: Duration = Duration::from_secs(5);

/// Liveness check run once per failure episode.
pub type ProbeFn = Arc<dyn Fn() + Send + Sync>;

/// Timing configuration for a [`ResilientClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for each read.
    pub read_timeout: Duration,
    /// Deadline for each write.
    pub write_timeout: Duration,
    /// Ping interval. `None` pings at half the read timeout; zero disables.
    pub keepalive_interval: Option<Duration>,
    /// Wait after a probe before reading again.
    pub probe_grace: Duration,
    /// Reconnect backoff.
    pub backoff: BackoffConfig,
}

impl ClientConfig {
    /// Returns the effective keepalive interval, or `None` if disabled.
    pub fn keepalive(&self) -> Option<Duration> {
        let interval = self.keepalive_interval.unwrap_or(self.read_timeout / 2);
        (!interval.is_zero()).then_some(interval)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            keepalive_interval: None,
            probe_grace: DEFAULT_PROBE_GRACE,
            backoff: BackoffConfig::default(),
        }
    }
}

/// What the listen loop does after a failed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadRecovery {
    Probe,
    Reconnect,
}

/// Consecutive read failures since the last successful read.
#[derive(Debug, Default)]
struct FailureEpisode {
    probed: bool,
}

impl FailureEpisode {
    fn on_failure(&mut self, can_probe: bool) -> ReadRecovery {
        if can_probe && !self.probed {
            self.probed = true;
            ReadRecovery::Probe
        } else {
            ReadRecovery::Reconnect
        }
    }

    fn reset(&mut self) {
        self.probed = false;
    }
}

/// A persistent connection with reconnect, backoff, and keepalive.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct ResilientClient {
    inner: Arc<Inner>,
}

struct Inner {
    dialer: Box<dyn Dialer>,
    config: ClientConfig,
    status: ConnectionStatus,
    writer: tokio::sync::Mutex<Option<Box<dyn FrameSink>>>,
    backoff: Mutex<Backoff>,
    probe: Mutex<Option<ProbeFn>>,
    messages: Subscribers<Frame>,
    connects: Subscribers<()>,
    disconnects: Subscribers<()>,
    cancel: CancellationToken,
    link_up: AtomicBool,
    started: AtomicBool,
    closed: AtomicBool,
}

impl ResilientClient {
    /// Create a client that dials through `dialer`.
    ///
    /// The client stops when `cancel` fires; [`ResilientClient::close`] stops
    /// only this client.
    pub fn new(
        dialer: impl Dialer + 'static,
        config: ClientConfig,
        cancel: &CancellationToken,
    ) -> Self {
        let backoff = Backoff::new(config.backoff);
        ResilientClient {
            inner: Arc::new(Inner {
                dialer: Box::new(dialer),
                config,
                status: ConnectionStatus::new(),
                writer: tokio::sync::Mutex::new(None),
                backoff: Mutex::new(backoff),
                probe: Mutex::new(None),
                messages: Subscribers::new(),
                connects: Subscribers::new(),
                disconnects: Subscribers::new(),
                cancel: cancel.child_token(),
                link_up: AtomicBool::new(false),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a client for a WebSocket URL.
    pub fn websocket(
        url: impl Into<String>,
        config: ClientConfig,
        cancel: &CancellationToken,
    ) -> Self {
        Self::new(WebSocketDialer::new(url), config, cancel)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the shared connection status.
    pub fn status(&self) -> &ConnectionStatus {
        &self.inner.status
    }

    pub fn is_connected(&self) -> bool {
        self.inner.status.is_connected()
    }

    /// Registers a callback for every data frame read.
    pub fn on_message(&self, callback: impl Fn(&Frame) + Send + Sync + 'static) {
        self.inner.messages.subscribe(callback);
    }

    /// Registers a callback for every established link.
    pub fn on_connect(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.connects.subscribe(move |_: &()| callback());
    }

    /// Registers a callback for every lost link.
    pub fn on_disconnect(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.disconnects.subscribe(move |_: &()| callback());
    }

    /// Sets the probe run on the first read failure of an episode.
    pub fn set_probe(&self, probe: impl Fn() + Send + Sync + 'static) {
        *self.inner.probe() = Some(Arc::new(probe));
    }

    /// Removes the probe, so every read failure reconnects.
    pub fn clear_probe(&self) {
        *self.inner.probe() = None;
    }

    /// Uses a ping as the probe.
    pub fn enable_heartbeat_probe(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.set_probe(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                if let Err(e) = inner.send(Frame::Ping(Vec::new())).await {
                    debug!("probe ping failed: {}", e);
                }
            });
        });
    }

    /// Dials once and starts the background loops.
    ///
    /// Returns the result of the first dial. On failure the listen loop keeps
    /// reconnecting in the background.
    pub async fn connect(&self) -> TransportResult<()> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(TransportError::AlreadyStarted);
        }
        let inner = &self.inner;

        inner.status.begin_attempt();
        let dialed = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => Err(TransportError::Cancelled),
            result = inner.dialer.dial() => result,
        };

        let (stream, wait, result) = match dialed {
            Ok(link) => {
                inner.backoff().reset();
                info!("connected");
                (Some(inner.install(link).await), None, Ok(()))
            }
            Err(e) => {
                inner.status.set(ConnectionState::Disconnected);
                let delay = inner.backoff().next_delay();
                warn!("connect failed: {}, retrying in {:?}", e, delay);
                (None, Some(delay), Err(e))
            }
        };

        if let Some(interval) = inner.config.keepalive() {
            tokio::spawn(Arc::clone(inner).keepalive(interval));
        }
        tokio::spawn(Arc::clone(inner).listen(stream, wait));

        result
    }

    /// Writes one frame within the write deadline.
    pub async fn send(&self, frame: Frame) -> TransportResult<()> {
        self.inner.send(frame).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> TransportResult<()> {
        self.send(Frame::Text(text.into())).await
    }

    pub async fn send_binary(&self, data: Vec<u8>) -> TransportResult<()> {
        self.send(Frame::Binary(data)).await
    }

    /// Serializes `value` as JSON and sends it as a text frame.
    pub async fn send_json<T: Serialize>(&self, value: &T) -> TransportResult<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        self.send_text(json).await
    }

    /// Sends a ping.
    pub async fn heartbeat(&self) -> TransportResult<()> {
        self.send(Frame::Ping(Vec::new())).await
    }

    /// Stops both loops and closes the connection.
    ///
    /// Fires "disconnected" if a link was up. Calling it again is a no-op.
    pub async fn close(&self) {
        self.inner.shutdown().await;
    }
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("status", &self.inner.status.status_string())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn backoff(&self) -> MutexGuard<'_, Backoff> {
        self.backoff.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn probe(&self) -> MutexGuard<'_, Option<ProbeFn>> {
        self.probe.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn send(&self, frame: Frame) -> TransportResult<()> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(TransportError::ConnectionLost)?;
        match timeout(self.config.write_timeout, sink.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout("write")),
        }
    }

    /// Makes `link` the current connection and returns its read half.
    async fn install(&self, link: Link) -> Box<dyn FrameStream> {
        *self.writer.lock().await = Some(link.sink);
        self.status.mark_connected();
        self.link_up.store(true, Ordering::Release);
        self.connects.emit(&());
        link.stream
    }

    /// Closes the current connection, firing "disconnected" once per link.
    async fn drop_link(&self) {
        let sink = self.writer.lock().await.take();
        self.status.set(ConnectionState::Disconnected);

        if let Some(mut sink) = sink {
            if let Ok(Err(e)) = timeout(self.config.write_timeout, sink.close()).await {
                debug!("close failed: {}", e);
            }
        }
        if self.link_up.swap(false, Ordering::AcqRel) {
            self.disconnects.emit(&());
        }
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        self.drop_link().await;
        debug!("client shut down");
    }

    async fn listen(
        self: Arc<Self>,
        mut stream: Option<Box<dyn FrameStream>>,
        mut wait: Option<Duration>,
    ) {
        let mut episode = FailureEpisode::default();

        loop {
            if stream.is_none() {
                match self.reconnect(wait.take()).await {
                    Some(fresh) => {
                        episode.reset();
                        stream = Some(fresh);
                    }
                    None => break,
                }
            }
            let Some(current) = stream.as_mut() else {
                continue;
            };

            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                read = timeout(self.config.read_timeout, current.recv()) => read,
            };

            let failure = match read {
                Ok(Ok(frame)) => {
                    episode.reset();
                    if frame.is_control() {
                        debug!("received {:?}", frame);
                    } else {
                        self.messages.emit(&frame);
                    }
                    continue;
                }
                Ok(Err(e)) => e,
                Err(_) => TransportError::Timeout("read"),
            };

            if failure.is_close() {
                info!("connection closed by peer, reconnecting");
                stream = None;
                self.drop_link().await;
                continue;
            }

            let probe = self.probe().clone();
            match (episode.on_failure(probe.is_some()), probe) {
                (ReadRecovery::Probe, Some(probe)) => {
                    warn!("read failed: {}, probing connection", failure);
                    probe();
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.probe_grace) => {}
                    }
                }
                _ => {
                    warn!("read failed: {}, reconnecting", failure);
                    stream = None;
                    self.drop_link().await;
                }
            }
        }

        self.shutdown().await;
        // A redial can install a link after close() already dropped the old one.
        self.drop_link().await;
    }

    /// Dials until a link is up, sleeping the backoff delay after each failure.
    ///
    /// Returns `None` once cancelled.
    async fn reconnect(&self, mut wait: Option<Duration>) -> Option<Box<dyn FrameStream>> {
        loop {
            if let Some(delay) = wait.take() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if self.cancel.is_cancelled() {
                return None;
            }

            let attempt = self.status.begin_attempt();
            let dialed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                result = self.dialer.dial() => result,
            };

            match dialed {
                Ok(link) => {
                    self.backoff().reset();
                    info!("reconnected after {} attempt(s)", attempt);
                    return Some(self.install(link).await);
                }
                Err(e) => {
                    let delay = self.backoff().next_delay();
                    warn!(
                        "reconnect attempt {} failed: {}, retrying in {:?}",
                        attempt, e, delay
                    );
                    wait = Some(delay);
                }
            }
        }
    }

    async fn keepalive(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if !self.status.is_connected() {
                        continue;
                    }
                    if let Err(e) = self.send(Frame::Ping(Vec::new())).await {
                        warn!("keepalive ping failed: {}", e);
                    }
                }
            }
        }
    }
}
