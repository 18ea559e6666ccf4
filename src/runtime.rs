//! Runtime for executing the conversation
//!
//! Wires the transport, decoder and state machine together on one task and
//! publishes a [`Conversation`] snapshot after every applied event.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::ConversationRuntime;
pub use traits::*;

use crate::config::ClientConfig;
use crate::state_machine::{Conversation, Event};
use crate::transport::{TransportHandle, TransportManager, WsConnector};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Prefix of locally generated correlation ids
const CORRELATION_PREFIX: &str = "ai-response-";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Conversation runtime has stopped")]
    Stopped,
}

/// Handle to interact with a running conversation
#[derive(Debug, Clone)]
pub struct ConversationHandle {
    pub(crate) event_tx: mpsc::Sender<Event>,
    pub(crate) snapshot_rx: watch::Receiver<Conversation>,
    pub(crate) transport: Option<TransportHandle>,
}

impl ConversationHandle {
    /// Submit a prompt; returns the correlation id of its placeholder.
    ///
    /// Empty prompts are rejected by the runtime and leave the transcript
    /// untouched.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<String, RuntimeError> {
        let correlation_id = format!("{CORRELATION_PREFIX}{}", uuid::Uuid::new_v4());
        self.event_tx
            .send(Event::user_message(text, correlation_id.clone()))
            .await
            .map_err(|_| RuntimeError::Stopped)?;
        Ok(correlation_id)
    }

    /// Current conversation state
    pub fn snapshot(&self) -> Conversation {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified after every applied event
    pub fn subscribe(&self) -> watch::Receiver<Conversation> {
        self.snapshot_rx.clone()
    }

    /// Close the transport; the runtime stops once it has drained the final
    /// status change. Idempotent.
    pub fn close(&self) {
        if let Some(transport) = &self.transport {
            transport.close();
        }
    }
}

/// Start a client against the configured backend
pub async fn start(config: &ClientConfig) -> ConversationHandle {
    let (transport, transport_rx) = TransportManager::open(config.transport(), WsConnector);
    let runtime = ConversationRuntime::new(config.context(), transport.clone(), transport_rx);
    let handle = runtime.handle(Some(transport.clone()));
    tokio::spawn(runtime.run());

    if let Err(e) = transport.connect().await {
        tracing::error!(error = %e, "Failed to start connection");
    }
    handle
}
