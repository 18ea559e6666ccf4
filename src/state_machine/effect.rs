//! Effects produced by state transitions

use crate::protocol::OutboundMessage;
use std::time::Duration;

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Hand a prompt to the transport
    Send {
        correlation_id: String,
        message: OutboundMessage,
    },

    /// Deliver [`Event::GuardElapsed`](super::Event::GuardElapsed) after `delay`
    ScheduleGuardReset { delay: Duration, generation: u64 },
}

impl Effect {
    pub fn send(correlation_id: impl Into<String>, message: OutboundMessage) -> Self {
        Effect::Send {
            correlation_id: correlation_id.into(),
            message,
        }
    }
}
