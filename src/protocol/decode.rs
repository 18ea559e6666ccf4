//! Frame classification
//!
//! Decoding is total: every input produces a [`ServerEvent`], malformed
//! frames included.

use super::types::{AgentStatus, ServerEvent, Step};
use serde_json::{Map, Value};
use thiserror::Error;

/// Transcript text shown when a frame cannot be decoded
pub const PARSE_FAILURE_TEXT: &str = "Failed to parse server message";

const DEFAULT_AGENT_CONTENT: &str = "Processing...";
const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, Error, PartialEq, Eq)]
enum DecodeFailure {
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("missing or non-string field `{0}`")]
    Field(&'static str),
    #[error("unknown agent status `{0}`")]
    Status(String),
}

/// Classify one raw inbound frame
pub fn decode(raw: &str) -> ServerEvent {
    match classify(raw) {
        Ok(event) => event,
        Err(failure) => ServerEvent::DecodeError {
            raw: raw.to_string(),
            reason: failure.to_string(),
        },
    }
}

fn classify(raw: &str) -> Result<ServerEvent, DecodeFailure> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| DecodeFailure::Json(e.to_string()))?;
    let Value::Object(frame) = value else {
        return Err(DecodeFailure::NotAnObject);
    };
    let frame_type = frame.get("type").and_then(Value::as_str);

    // Step status updates are informational and take precedence over
    // everything else, including the success flag.
    if frame_type == Some("agent_step_status") {
        let status = required_str(&frame, "status")?;
        return Ok(ServerEvent::AgentStepStatus {
            agent_type: required_str(&frame, "agent_type")?,
            status: AgentStatus::from_wire(&status).ok_or(DecodeFailure::Status(status))?,
            content: optional_str(&frame, "content").unwrap_or_default(),
        });
    }

    if frame.get("success") == Some(&Value::Bool(true)) {
        return Ok(ServerEvent::Success {
            response: required_str(&frame, "response")?,
            steps: parse_steps(&frame),
        });
    }

    let event = match frame_type {
        Some("agent_start") => ServerEvent::AgentStart {
            agent_type: required_str(&frame, "agent_type")?,
            content: optional_str(&frame, "content")
                .filter(|content| !content.is_empty())
                .unwrap_or_else(|| DEFAULT_AGENT_CONTENT.to_string()),
        },
        Some("agent_complete") => ServerEvent::AgentComplete {
            agent_type: required_str(&frame, "agent_type")?,
        },
        Some("stream") => ServerEvent::StreamToken {
            content: required_str(&frame, "content")?,
        },
        Some("final") => ServerEvent::FinalMarker,
        Some("complete") => ServerEvent::CompleteMarker,
        Some("error") => ServerEvent::Failure {
            message: failure_message(&frame),
        },
        _ if frame.get("success") == Some(&Value::Bool(false)) => ServerEvent::Failure {
            message: failure_message(&frame),
        },
        _ => ServerEvent::Unrecognized {
            raw: raw.to_string(),
        },
    };
    Ok(event)
}

fn required_str(frame: &Map<String, Value>, field: &'static str) -> Result<String, DecodeFailure> {
    optional_str(frame, field).ok_or(DecodeFailure::Field(field))
}

fn optional_str(frame: &Map<String, Value>, field: &str) -> Option<String> {
    frame.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Steps are best-effort: entries that are not objects, or carry no string
/// `agent`, keep their position with `agent: None`.
fn parse_steps(frame: &Map<String, Value>) -> Vec<Step> {
    frame
        .get("steps")
        .and_then(Value::as_array)
        .map(|steps| {
            steps
                .iter()
                .map(|step| Step {
                    agent: step.get("agent").and_then(Value::as_str).map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// `message` if non-empty, else the `error` list joined with `", "`, else a
/// generic fallback.
fn failure_message(frame: &Map<String, Value>) -> String {
    if let Some(message) = frame
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
    {
        return message.to_string();
    }

    if let Some(errors) = frame.get("error").and_then(Value::as_array) {
        let joined = errors
            .iter()
            .map(|error| match error {
                Value::String(text) => text.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        if !joined.is_empty() {
            return joined;
        }
    }

    UNKNOWN_ERROR.to_string()
}
