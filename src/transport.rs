//! Persistent connection to the chat backend
//!
//! A single task owns the socket, the reconnect timer and the connection
//! state. Callers talk to it through a cloneable [`TransportHandle`] and
//! receive inbound frames and status changes, in socket order, on the event
//! channel returned by [`TransportManager::open`].
//!
//! Reconnection uses a flat interval with no upper bound on attempts; it
//! stops only when the transport is closed.

mod manager;
pub mod traits;


pub use manager::{TransportConfig, TransportHandle, TransportManager, DEFAULT_RETRY_INTERVAL};
pub use traits::{Connection, Connector, WsConnection, WsConnector};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connection lifecycle as seen by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// What happened to one outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the open socket
    Sent,
    /// Discarded because no connection was open, or the write failed
    Dropped,
}

/// Everything the transport reports upstream, in delivery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Status(ConnectionState),
    Frame(String),
}

/// Transport failures. None of these are fatal; the manager recovers by
/// reconnecting.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },
    #[error("Socket error: {0}")]
    Socket(String),
    #[error("Failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Transport is closed")]
    Closed,
}
