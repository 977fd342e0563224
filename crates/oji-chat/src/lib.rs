//! oji-chat: conversation state and request driving
//!
//! This crate keeps the set of conversations, turns user input into chat
//! requests whose replies are folded back into the right conversation, and
//! probes endpoints for reachability.

pub mod conversation;
pub mod error;
pub mod events;
pub mod handle;
pub mod orchestrator;
pub mod probe;
pub mod store;

pub use conversation::{Conversation, ConversationId, DEFAULT_CONVERSATION_NAME, derive_display_name};
pub use error::{Error, Result};
pub use events::ChatEvent;
pub use handle::ChatHandle;
pub use orchestrator::{ChatConfig, Orchestrator, RequestOptions, SendOutcome};
pub use probe::{ConnectionProbe, ProbeHandle, ProbePresentation, ProbeState, ProbeStatus};
pub use store::{SessionStore, SharedStore};
