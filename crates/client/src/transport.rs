//! Transport abstraction for room channels.
//!
//! The manager talks to a [`Connector`], which opens duplex text
//! [`Channel`]s. [`WebSocketConnector`] is the production implementation
//! over `tokio-tungstenite`; tests substitute scripted connectors.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::endpoint::redacted;

/// An open duplex channel carrying text frames.
#[async_trait]
pub trait Channel: Send {
    /// Write one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next text frame.
    ///
    /// Returns `Ok(None)` once the peer has closed the channel cleanly.
    /// Must be cancel-safe: it is raced against outbound traffic and
    /// cancellation.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Close the channel. Closing an already-closed channel is not an error.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens channels to an endpoint URL.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &Url) -> Result<Box<dyn Channel>, TransportError>;
}

/// Errors raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Failed to establish the channel.
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Send error: {0}")]
    Send(String),

    #[error("Receive error: {0}")]
    Receive(String),

    #[error("Close error: {0}")]
    Close(String),
}

// ---- WebSocket implementation ----

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Opens real WebSocket channels (`ws://` or `wss://`).
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &Url) -> Result<Box<dyn Channel>, TransportError> {
        let (ws_stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
            TransportError::Connect(format!("Failed to connect to {}: {e}", redacted(url)))
        })?;

        tracing::debug!(endpoint = %redacted(url), "WebSocket handshake complete");

        Ok(Box::new(WebSocketChannel { ws_stream }))
    }
}

/// A live WebSocket connection.
pub struct WebSocketChannel {
    ws_stream: WsStream,
}

#[async_trait]
impl Channel for WebSocketChannel {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.ws_stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.ws_stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    tracing::trace!(len = data.len(), "Ignoring binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Handled automatically by tungstenite.
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "Peer sent close frame");
                    return Ok(None);
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(tungstenite::Error::ConnectionClosed)) | None => return Ok(None),
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.ws_stream.close(None).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Close(e.to_string())),
        }
    }
}
