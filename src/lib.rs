//! Agent chat client
//!
//! Keeps one WebSocket connection to a multi-agent backend, decodes its
//! streaming frames and folds them into a conversation transcript that a
//! presentation layer can render.
//!
//! ```no_run
//! # async fn demo() -> Result<(), agent_chat::RuntimeError> {
//! let config = agent_chat::ClientConfig::from_env();
//! let chat = agent_chat::start(&config).await;
//! chat.send_message("How many orders shipped today?").await?;
//! let mut updates = chat.subscribe();
//! while updates.changed().await.is_ok() {
//!     println!("{:?}", updates.borrow().streaming());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod protocol;
pub mod runtime;
pub mod state_machine;
pub mod transport;

pub use config::{ClientConfig, DedupStrategy, SessionContext};
pub use runtime::{start, ConversationHandle, ConversationRuntime, MessageSink, RuntimeError};
pub use state_machine::{Conversation, EntryKind, TranscriptEntry};
pub use transport::{ConnectionState, Delivery, TransportHandle, TransportManager};
