//! Chat event types

use oji_ai::Message;
use serde::{Deserialize, Serialize};

use crate::conversation::ConversationId;

/// Events emitted while a request is in flight
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A request was accepted; the assistant is thinking
    RequestStart { conversation_id: ConversationId },

    /// A message was appended to a conversation
    MessageAppended {
        conversation_id: ConversationId,
        message: Message,
    },

    /// The streamed assistant message grew
    MessageUpdated {
        conversation_id: ConversationId,
        delta: String,
        message: Message,
    },

    /// The request finished, successfully or not
    RequestEnd { conversation_id: ConversationId },

    /// A visible failure
    Error {
        conversation_id: ConversationId,
        title: String,
        detail: String,
    },
}

impl ChatEvent {
    pub fn conversation_id(&self) -> ConversationId {
        match self {
            ChatEvent::RequestStart { conversation_id }
            | ChatEvent::MessageAppended { conversation_id, .. }
            | ChatEvent::MessageUpdated { conversation_id, .. }
            | ChatEvent::RequestEnd { conversation_id }
            | ChatEvent::Error { conversation_id, .. } => *conversation_id,
        }
    }

    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::RequestEnd { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ChatEvent::Error {
            conversation_id: ConversationId(3),
            title: "Authentication failed".into(),
            detail: "401 Unauthorized: bad key".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["conversation_id"], 3);
        assert_eq!(event.conversation_id(), ConversationId(3));
        assert!(!event.is_terminal());
        assert!(ChatEvent::RequestEnd { conversation_id: ConversationId(1) }.is_terminal());
    }
}
