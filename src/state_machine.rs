//! Core conversation state machine
//!
//! Implements the Elm Architecture pattern: [`transition`] applies one
//! [`Event`] to the [`Conversation`] and returns the [`Effect`]s the runtime
//! has to carry out. No I/O happens here.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::Event;
pub use state::{
    AgentActivity, ConvContext, ConvState, Conversation, EntryKind, TranscriptEntry,
    CONNECTED_NOTICE, DISCONNECTED_NOTICE, PLACEHOLDER_TEXT, STREAM_SEPARATOR,
};
pub use transition::{transition, TransitionError, TransitionResult};
