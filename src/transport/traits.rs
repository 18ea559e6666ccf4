//! Trait abstractions for the socket layer
//!
//! These traits let the transport manager run against a scripted connection
//! in tests.

use super::TransportError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Opens connections to the backend endpoint
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError>;
}

/// One open, bidirectional text connection
#[async_trait]
pub trait Connection: Send + 'static {
    /// Transmit one text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound text frame, or `None` once the peer has closed
    ///
    /// Must be cancel safe: the manager polls it inside `select!`.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the connection, ignoring failures
    async fn close(&mut self);
}

// ============================================================================
// Production Adapter
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector backed by `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

/// An open WebSocket
pub struct WsConnection {
    stream: WsStream,
}

#[async_trait]
impl Connector for WsConnector {
    type Connection = WsConnection;

    async fn connect(&self, url: &str) -> Result<WsConnection, TransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(WsConnection { stream })
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => return Some(Ok(binary_frame_text(&bytes))),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "Peer sent close frame");
                    return None;
                }
                // tungstenite answers pings itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(TransportError::Socket(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "Error while closing socket");
        }
    }
}

/// Text carried by a binary frame; invalid UTF-8 is replaced and logged
fn binary_frame_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(e) => {
            tracing::warn!(error = %e, len = bytes.len(), "Binary frame is not valid UTF-8");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}
