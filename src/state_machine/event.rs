//! Events that drive state transitions

use crate::protocol::ServerEvent;
use crate::transport::ConnectionState;

/// Everything the conversation reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The user submitted a prompt
    UserMessage {
        text: String,
        /// Id of the placeholder entry the reply streams into
        correlation_id: String,
    },

    /// A decoded inbound frame
    Server(ServerEvent),

    /// The transport discarded the prompt sent for `correlation_id`
    SendDropped { correlation_id: String },

    /// The transport changed connection state
    Connection(ConnectionState),

    /// The success guard armed with `generation` has expired
    GuardElapsed { generation: u64 },
}

impl Event {
    pub fn user_message(text: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Event::UserMessage {
            text: text.into(),
            correlation_id: correlation_id.into(),
        }
    }
}

impl From<ServerEvent> for Event {
    fn from(event: ServerEvent) -> Self {
        Event::Server(event)
    }
}
