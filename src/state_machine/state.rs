//! Conversation state types

use crate::config::{DedupStrategy, SessionContext, DEFAULT_DEBOUNCE};
use crate::protocol::AgentStatus;
use crate::transport::ConnectionState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Text of the assistant entry created before any reply arrives
pub const PLACEHOLDER_TEXT: &str = "...";
/// Appended to the streaming buffer on a final marker
pub const STREAM_SEPARATOR: &str = "\n\n---\n\n";
pub const CONNECTED_NOTICE: &str = "Connected to server";
pub const DISCONNECTED_NOTICE: &str = "Disconnected from server";

const USER_SENDER: &str = "human";
const ASSISTANT_SENDER: &str = "AI";
const SYSTEM_SENDER: &str = "System";
const ERROR_SENDER: &str = "Error";

// ============================================================================
// Transcript
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    User,
    Assistant,
    System,
    Error,
}

/// One line of the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub sender: String,
    pub text: String,
    pub kind: EntryKind,
    /// Set on the placeholder that streamed text is mirrored into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// The exchange owning this entry was abandoned before it finished
    #[serde(default)]
    pub interrupted: bool,
}

impl TranscriptEntry {
    fn new(sender: &str, text: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            sender: sender.to_string(),
            text: text.into(),
            kind,
            correlation_id: None,
            interrupted: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(USER_SENDER, text, EntryKind::User)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(ASSISTANT_SENDER, text, EntryKind::Assistant)
    }

    pub fn placeholder(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Self::assistant(PLACEHOLDER_TEXT)
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(SYSTEM_SENDER, text, EntryKind::System)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(ERROR_SENDER, text, EntryKind::Error)
    }
}

// ============================================================================
// Agents
// ============================================================================

/// Live status of one named agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentActivity {
    pub status: AgentStatus,
    pub content: String,
}

// ============================================================================
// Conversation State
// ============================================================================

/// Exchange phase
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConvState {
    /// No reply is expected
    #[default]
    Idle,
    /// A prompt was sent and its placeholder awaits a terminal event
    AwaitingResponse { correlation_id: String },
}

/// Everything the presentation layer renders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Conversation {
    pub(super) state: ConvState,
    pub(super) transcript: Vec<TranscriptEntry>,
    pub(super) streaming: String,
    pub(super) agents: HashMap<String, AgentActivity>,
    pub(super) connection: ConnectionState,
    /// Generation of the armed success guard, if any
    pub(super) success_guard: Option<u64>,
    #[serde(skip)]
    pub(super) guard_generation: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConvState {
        &self.state
    }

    /// Entries in insertion order
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Text of the reply currently being streamed
    pub fn streaming(&self) -> &str {
        &self.streaming
    }

    pub fn agents(&self) -> &HashMap<String, AgentActivity> {
        &self.agents
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn active_correlation_id(&self) -> Option<&str> {
        match &self.state {
            ConvState::AwaitingResponse { correlation_id } => Some(correlation_id),
            ConvState::Idle => None,
        }
    }

    /// Whether success responses are currently being suppressed
    pub fn is_finalizing(&self) -> bool {
        self.success_guard.is_some()
    }

    pub(super) fn push(&mut self, entry: TranscriptEntry) {
        self.transcript.push(entry);
    }

    fn entry_mut(&mut self, correlation_id: &str) -> Option<&mut TranscriptEntry> {
        self.transcript
            .iter_mut()
            .rev()
            .find(|entry| entry.correlation_id.as_deref() == Some(correlation_id))
    }

    /// Copy the streaming buffer into the active placeholder, if it still
    /// exists. Returns whether an entry was updated.
    pub(super) fn mirror_stream(&mut self) -> bool {
        let ConvState::AwaitingResponse { correlation_id } = &self.state else {
            return false;
        };
        let correlation_id = correlation_id.clone();
        let text = self.streaming.clone();
        match self.entry_mut(&correlation_id) {
            Some(entry) => {
                entry.text = text;
                true
            }
            None => false,
        }
    }

    pub(super) fn mark_interrupted(&mut self, correlation_id: &str) {
        if let Some(entry) = self.entry_mut(correlation_id) {
            entry.interrupted = true;
        }
    }

    /// End the pending exchange normally
    pub(super) fn retire_exchange(&mut self) {
        self.state = ConvState::Idle;
    }

    /// End the pending exchange without a reply and flag its placeholder
    pub(super) fn abandon_exchange(&mut self) -> Option<String> {
        let ConvState::AwaitingResponse { correlation_id } = std::mem::take(&mut self.state)
        else {
            return None;
        };
        self.mark_interrupted(&correlation_id);
        Some(correlation_id)
    }

    /// Drop the streaming buffer and every agent activity
    pub(super) fn clear_response(&mut self) {
        self.streaming.clear();
        self.agents.clear();
    }

    /// Arm the success guard with a fresh generation
    pub(super) fn arm_success_guard(&mut self) -> u64 {
        self.guard_generation += 1;
        self.success_guard = Some(self.guard_generation);
        self.guard_generation
    }

    /// Release the guard if `generation` is still the armed one
    pub(super) fn release_success_guard(&mut self, generation: u64) -> bool {
        if self.success_guard == Some(generation) {
            self.success_guard = None;
            true
        } else {
            false
        }
    }
}

// ============================================================================
// Context
// ============================================================================

/// Immutable configuration for a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvContext {
    pub session: SessionContext,
    pub dedup: DedupStrategy,
    /// How long success responses stay suppressed under
    /// [`DedupStrategy::Debounce`]
    pub debounce: Duration,
}

impl Default for ConvContext {
    fn default() -> Self {
        Self::new(SessionContext::default(), DedupStrategy::default(), DEFAULT_DEBOUNCE)
    }
}

impl ConvContext {
    pub fn new(session: SessionContext, dedup: DedupStrategy, debounce: Duration) -> Self {
        Self {
            session,
            dedup,
            debounce,
        }
    }
}
