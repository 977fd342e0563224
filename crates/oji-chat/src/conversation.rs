//! Conversation records and display-name derivation.

use std::fmt;

use oji_ai::Message;
use serde::{Deserialize, Serialize};

/// Name given to conversations before their first message
pub const DEFAULT_CONVERSATION_NAME: &str = "New Chat";

/// Maximum number of characters kept when deriving a name from a message
pub const MAX_DERIVED_NAME_CHARS: usize = 30;

/// Identifier of a conversation, assigned in increasing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub u64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named conversation and its stored message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub display_name: String,
    pub messages: Vec<Message>,
    /// Set once the user renames the conversation; disables auto-naming
    #[serde(default)]
    pub renamed: bool,
}

impl Conversation {
    pub fn new(id: ConversationId) -> Self {
        Self::named(id, DEFAULT_CONVERSATION_NAME)
    }

    pub fn named(id: ConversationId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            messages: Vec::new(),
            renamed: false,
        }
    }
}

/// Derive a conversation name from the first user message.
///
/// Trims, turns newlines into spaces, and keeps at most 30 characters,
/// appending "..." when something was cut.
pub fn derive_display_name(message: &str) -> String {
    let clean = message.trim().replace("\r\n", " ").replace('\n', " ");
    let mut chars = clean.chars();
    let kept: String = chars.by_ref().take(MAX_DERIVED_NAME_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", kept)
    } else {
        kept
    }
}
