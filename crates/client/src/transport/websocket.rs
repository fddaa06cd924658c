// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket dialer using tokio-tungstenite.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{Dialer, Frame, FrameSink, FrameStream, Link, TransportError, TransportFuture};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials a WebSocket server at a fixed URL.
#[derive(Debug, Clone)]
pub struct WebSocketDialer {
    url: String,
}

impl WebSocketDialer {
    /// Create a dialer for `url` (`ws://` or `wss://`).
    pub fn new(url: impl Into<String>) -> Self {
        WebSocketDialer { url: url.into() }
    }

    /// Returns the URL this dialer connects to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Dialer for WebSocketDialer {
    fn dial(&self) -> TransportFuture<'_, Link> {
        Box::pin(async move {
            let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

            let (sink, stream) = ws_stream.split();
            Ok(Link {
                sink: Box::new(WebSocketSink { sink }),
                stream: Box::new(WebSocketFrames { stream }),
            })
        })
    }
}

struct WebSocketSink {
    sink: SplitSink<Socket, Message>,
}

impl FrameSink for WebSocketSink {
    fn send(&mut self, frame: Frame) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let msg = match frame {
                Frame::Text(text) => Message::Text(text.into()),
                Frame::Binary(data) => Message::Binary(data.into()),
                Frame::Ping(data) => Message::Ping(data.into()),
                Frame::Pong(data) => Message::Pong(data.into()),
            };

            self.sink
                .send(msg)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;

            // Flush so a broken connection surfaces here rather than later
            self.sink
                .flush()
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        })
    }

    fn close(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.sink
                .close()
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        })
    }
}

struct WebSocketFrames {
    stream: SplitStream<Socket>,
}

impl FrameStream for WebSocketFrames {
    fn recv(&mut self) -> TransportFuture<'_, Frame> {
        Box::pin(async move {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return Ok(Frame::Text(text.as_str().to_string()))
                    }
                    Some(Ok(Message::Binary(data))) => return Ok(Frame::Binary(data.to_vec())),
                    Some(Ok(Message::Ping(data))) => return Ok(Frame::Ping(data.to_vec())),
                    Some(Ok(Message::Pong(data))) => return Ok(Frame::Pong(data.to_vec())),
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(TransportError::ConnectionClosed)
                    }
                    Some(Ok(Message::Frame(_))) => continue,
                    Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                }
            }
        })
    }
}
