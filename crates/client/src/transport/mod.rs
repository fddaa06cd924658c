// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Resilient persistent-socket transport.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  dial   ┌──────────┐
//! │ ResilientClient  │────────►│  Dialer  │ (trait)
//! │                  │◄────────│          │
//! └──────────────────┘  Link   └──────────┘
//!    │          │
//!    │ send     │ listen loop: read deadline, probe once, reconnect
//!    ▼          ▼
//! ┌──────────┐ ┌─────────────┐
//! │FrameSink │ │ FrameStream │
//! └──────────┘ └─────────────┘
//! ```
//!
//! - [`WebSocketDialer`] for production over `tokio-tungstenite`
//! - In-memory dialers for unit tests

use std::future::Future;
use std::pin::Pin;

mod backoff;
mod client;
mod status;
mod websocket;

pub use backoff::{Backoff, BackoffConfig};
pub use client::{ClientConfig, ProbeFn, ResilientClient};
pub use status::{ConnectionState, ConnectionStatus};
pub use websocket::WebSocketDialer;




/// One frame on the persistent socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Control-plane JSON.
    Text(String),
    /// Data-plane content.
    Binary(Vec<u8>),
    /// Keepalive request.
    Ping(Vec<u8>),
    /// Keepalive reply.
    Pong(Vec<u8>),
}

impl Frame {
    /// Returns true for keepalive frames.
    pub fn is_control(&self) -> bool {
        matches!(self, Frame::Ping(_) | Frame::Pong(_))
    }
}

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Dialing the remote failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// No connection is currently usable.
    #[error("connection lost")]
    ConnectionLost,

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// A read or write deadline expired.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The client was shut down.
    #[error("client shut down")]
    Cancelled,

    /// `connect` was called more than once.
    #[error("client already started")]
    AlreadyStarted,
}

impl TransportError {
    /// Returns true if the peer closed the connection, as opposed to the
    /// connection failing.
    pub fn is_close(&self) -> bool {
        matches!(self, TransportError::ConnectionClosed)
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Boxed future returned by transport traits.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = TransportResult<T>> + Send + 'a>>;

/// Write half of a connection.
pub trait FrameSink: Send {
    /// Writes and flushes one frame.
    fn send(&mut self, frame: Frame) -> TransportFuture<'_, ()>;

    /// Closes the connection.
    fn close(&mut self) -> TransportFuture<'_, ()>;
}

/// Read half of a connection.
pub trait FrameStream: Send {
    /// Reads the next frame.
    ///
    /// Returns [`TransportError::ConnectionClosed`] once the peer has closed
    /// the connection. Must be cancel-safe: the caller races it against a
    /// read deadline.
    fn recv(&mut self) -> TransportFuture<'_, Frame>;
}

/// An established connection, split into halves.
pub struct Link {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Establishes connections to a fixed remote.
///
/// This trait abstracts over the actual socket, allowing the connection
/// loops to be tested with in-memory implementations.
pub trait Dialer: Send + Sync {
    /// Dials the remote once.
    fn dial(&self) -> TransportFuture<'_, Link>;
}
