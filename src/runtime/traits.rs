//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::protocol::OutboundMessage;
use crate::transport::{Delivery, TransportError, TransportHandle};
use async_trait::async_trait;
use std::sync::Arc;

/// Destination for outbound prompts
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Hand one prompt to the transport and report whether it went out
    async fn send(&self, message: OutboundMessage) -> Result<Delivery, TransportError>;
}

#[async_trait]
impl MessageSink for TransportHandle {
    async fn send(&self, message: OutboundMessage) -> Result<Delivery, TransportError> {
        TransportHandle::send(self, message).await
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: MessageSink + ?Sized> MessageSink for Arc<T> {
    async fn send(&self, message: OutboundMessage) -> Result<Delivery, TransportError> {
        (**self).send(message).await
    }
}
