//! Protocol message types

use serde::{Deserialize, Serialize};

/// Lifecycle status reported for a single agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Thinking,
    Completed,
    Error,
}

impl AgentStatus {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "thinking" => Some(Self::Thinking),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One processing step attached to a non-streaming response
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Step {
    /// Agent that handled the step; the backend uses `"end"` as a sentinel
    #[serde(default)]
    pub agent: Option<String>,
}

impl Step {
    pub fn agent(agent: impl Into<String>) -> Self {
        Self {
            agent: Some(agent.into()),
        }
    }
}

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Informational agent update
    AgentStepStatus {
        agent_type: String,
        status: AgentStatus,
        content: String,
    },
    /// Agent begins work
    AgentStart { agent_type: String, content: String },
    /// Agent finished
    AgentComplete { agent_type: String },
    /// One fragment of the in-progress reply
    StreamToken { content: String },
    /// A separator is due before the next reasoning segment
    FinalMarker,
    /// The streamed reply is fully delivered
    CompleteMarker,
    /// Complete non-streaming answer. `response` is the raw backend text.
    Success { response: String, steps: Vec<Step> },
    /// Backend-reported failure, already resolved to display text
    Failure { message: String },
    /// Frame did not match the expected schema
    DecodeError { raw: String, reason: String },
    /// Well-formed object that matches no known frame shape
    Unrecognized { raw: String },
}

impl ServerEvent {
    /// Whether this event ends the exchange currently awaiting a reply
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerEvent::CompleteMarker | ServerEvent::Success { .. } | ServerEvent::Failure { .. }
        )
    }
}

/// Prompt payload sent to the backend
///
/// Everything except `prompt` is session context supplied by the embedding
/// application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub prompt: String,
    pub company_id: String,
    pub chat_room_id: String,
    pub company_name: String,
    pub user_id: String,
}
