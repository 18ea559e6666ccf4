//! Pure state transition function
//!
//! Applies one event to the conversation and reports the effects the runtime
//! must carry out. Nothing here touches the network or the clock.

use super::state::{
    AgentActivity, ConvContext, ConvState, Conversation, TranscriptEntry, CONNECTED_NOTICE,
    DISCONNECTED_NOTICE, STREAM_SEPARATOR,
};
use super::{Effect, Event};
use crate::config::DedupStrategy;
use crate::protocol::{clean_response_text, AgentStatus, ServerEvent, Step, PARSE_FAILURE_TEXT};
use crate::transport::ConnectionState;
use thiserror::Error;

/// Agent reported when a success response names no usable step
const DEFAULT_AGENT: &str = "AI";
/// Sentinel step the backend appends after the last real agent
const END_STEP: &str = "end";

/// Result of a state transition
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TransitionResult {
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Prompt is empty")]
    EmptyPrompt,
}

/// Pure transition function.
///
/// The conversation is only modified when `Ok` is returned.
pub fn transition(
    conv: &mut Conversation,
    ctx: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match event {
        Event::UserMessage {
            text,
            correlation_id,
        } => user_message(conv, ctx, text, correlation_id),
        Event::Server(event) => Ok(server_event(conv, ctx, event)),
        Event::SendDropped { correlation_id } => {
            send_dropped(conv, &correlation_id);
            Ok(TransitionResult::new())
        }
        Event::Connection(status) => {
            connection_changed(conv, status);
            Ok(TransitionResult::new())
        }
        Event::GuardElapsed { generation } => {
            if !conv.release_success_guard(generation) {
                tracing::debug!(generation, "Ignoring stale guard reset");
            }
            Ok(TransitionResult::new())
        }
    }
}

// ============================================================
// User Messages
// ============================================================

fn user_message(
    conv: &mut Conversation,
    ctx: &ConvContext,
    text: String,
    correlation_id: String,
) -> Result<TransitionResult, TransitionError> {
    if text.trim().is_empty() {
        return Err(TransitionError::EmptyPrompt);
    }

    // A new send supersedes whatever exchange was still pending
    if let Some(previous) = conv.active_correlation_id() {
        tracing::debug!(previous, "Superseding pending exchange");
    }

    let message = ctx.session.outbound(text.clone());
    conv.push(TranscriptEntry::user(text));
    conv.push(TranscriptEntry::placeholder(correlation_id.clone()));
    conv.streaming.clear();
    conv.state = ConvState::AwaitingResponse {
        correlation_id: correlation_id.clone(),
    };

    Ok(TransitionResult::new().with_effect(Effect::send(correlation_id, message)))
}

/// The transport never transmitted the prompt, so no reply will arrive
fn send_dropped(conv: &mut Conversation, correlation_id: &str) {
    if conv.active_correlation_id() == Some(correlation_id) {
        conv.abandon_exchange();
        conv.clear_response();
    } else {
        conv.mark_interrupted(correlation_id);
    }
}

// ============================================================
// Server Events
// ============================================================

fn server_event(conv: &mut Conversation, ctx: &ConvContext, event: ServerEvent) -> TransitionResult {
    match event {
        ServerEvent::AgentStepStatus {
            agent_type,
            status,
            content,
        } => {
            conv.agents.insert(agent_type, AgentActivity { status, content });
        }

        ServerEvent::AgentStart {
            agent_type,
            content,
        } => {
            conv.agents.insert(
                agent_type,
                AgentActivity {
                    status: AgentStatus::Thinking,
                    content,
                },
            );
        }

        ServerEvent::AgentComplete { agent_type } => {
            conv.agents.remove(&agent_type);
        }

        ServerEvent::StreamToken { content } => {
            conv.streaming.push_str(&content);
            conv.mirror_stream();
        }

        ServerEvent::FinalMarker => {
            conv.streaming.push_str(STREAM_SEPARATOR);
            conv.mirror_stream();
        }

        ServerEvent::CompleteMarker => {
            conv.clear_response();
            conv.retire_exchange();
        }

        ServerEvent::Success { response, steps } => return success(conv, ctx, &response, &steps),

        ServerEvent::Failure { message } => {
            conv.push(TranscriptEntry::error(message));
            conv.clear_response();
            conv.retire_exchange();
        }

        ServerEvent::DecodeError { raw, reason } => {
            tracing::warn!(%reason, raw_len = raw.len(), "Failed to parse server message");
            conv.push(TranscriptEntry::error(PARSE_FAILURE_TEXT));
        }

        ServerEvent::Unrecognized { raw } => {
            tracing::debug!(raw_len = raw.len(), "Ignoring unrecognized server message");
        }
    }

    TransitionResult::new()
}

fn success(
    conv: &mut Conversation,
    ctx: &ConvContext,
    response: &str,
    steps: &[Step],
) -> TransitionResult {
    let honored = match ctx.dedup {
        DedupStrategy::Debounce => !conv.is_finalizing(),
        DedupStrategy::ActiveExchange => conv.active_correlation_id().is_some(),
    };
    if !honored {
        tracing::debug!(dedup = ?ctx.dedup, "Dropping duplicate success response");
        return TransitionResult::new();
    }

    tracing::debug!(agent = last_agent(steps), "Success response");
    conv.push(TranscriptEntry::assistant(clean_response_text(response)));
    conv.clear_response();
    conv.retire_exchange();

    match ctx.dedup {
        DedupStrategy::Debounce => {
            let generation = conv.arm_success_guard();
            TransitionResult::new().with_effect(Effect::ScheduleGuardReset {
                delay: ctx.debounce,
                generation,
            })
        }
        DedupStrategy::ActiveExchange => TransitionResult::new(),
    }
}

/// Last agent in `steps` that is not the end sentinel
fn last_agent(steps: &[Step]) -> &str {
    steps
        .iter()
        .rev()
        .filter_map(|step| step.agent.as_deref())
        .find(|agent| *agent != END_STEP)
        .unwrap_or(DEFAULT_AGENT)
}

// ============================================================
// Connection Changes
// ============================================================

fn connection_changed(conv: &mut Conversation, status: ConnectionState) {
    let previous = std::mem::replace(&mut conv.connection, status);
    if previous == status {
        return;
    }

    // Only a live connection can lose a reply; sends made while offline are
    // reported through `SendDropped`
    if previous.is_connected() {
        if let Some(abandoned) = conv.abandon_exchange() {
            tracing::info!(correlation_id = %abandoned, "Exchange interrupted by disconnect");
        }
    }
    if status == ConnectionState::Disconnected {
        conv.clear_response();
    }

    match (previous, status) {
        (_, ConnectionState::Connected) => {
            conv.push(TranscriptEntry::system(CONNECTED_NOTICE));
        }
        (ConnectionState::Connected, ConnectionState::Disconnected) => {
            conv.push(TranscriptEntry::system(DISCONNECTED_NOTICE));
        }
        _ => {}
    }
}
