//! Wire protocol for the chat backend
//!
//! Every frame is a JSON text message. Inbound frames are classified by
//! [`decode`] into a [`ServerEvent`]; the only outbound payload is the
//! [`OutboundMessage`] prompt.

mod cleanup;
mod decode;
mod types;

pub use cleanup::clean_response_text;
pub use decode::{decode, PARSE_FAILURE_TEXT};
pub use types::{AgentStatus, OutboundMessage, ServerEvent, Step};
