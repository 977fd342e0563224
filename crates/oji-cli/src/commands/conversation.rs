//! Conversation listing and position lookup

use oji_ai::{Message, Role};
use oji_chat::{ConversationId, SessionStore};

pub struct ConversationCommand;

impl ConversationCommand {
    /// Map a 1-based position to a conversation; `None` means the active one
    pub fn resolve(store: &SessionStore, position: Option<usize>) -> Result<ConversationId, String> {
        let Some(n) = position else {
            return Ok(store.active_id());
        };
        store
            .conversations()
            .get(n.wrapping_sub(1))
            .map(|c| c.id)
            .ok_or_else(|| format!("No chat at position {} (there are {})", n, store.len()))
    }

    /// List conversations as text
    pub fn list_text(store: &SessionStore) -> String {
        let mut output = String::from("Chats:\n");
        for (i, conversation) in store.conversations().iter().enumerate() {
            let count = store.messages_of(conversation.id).map_or(0, |m| m.len());
            let marker = if conversation.id == store.active_id() { " *" } else { "" };
            output.push_str(&format!(
                "  {}. {} ({} messages){}\n",
                i + 1,
                conversation.display_name,
                count,
                marker
            ));
        }
        output.push_str("\nSwitch with: /switch <n>");
        output
    }

    /// Render messages the way the REPL prints them live
    pub fn transcript(messages: &[Message]) -> String {
        let mut output = String::new();
        for message in messages {
            let speaker = match message.role {
                Role::User => "you",
                Role::Assistant => "oji",
                Role::System => "system",
            };
            output.push_str(&format!("{}: {}", speaker, message.content));
            for attachment in &message.attachments {
                output.push_str(&format!(" [{}]", attachment.display_name));
            }
            output.push_str("\n\n");
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_positions() {
        let mut store = SessionStore::new();
        let first = store.active_id();
        let second = store.create_conversation();

        assert_eq!(ConversationCommand::resolve(&store, None).unwrap(), second);
        assert_eq!(ConversationCommand::resolve(&store, Some(1)).unwrap(), first);
        assert!(ConversationCommand::resolve(&store, Some(3)).is_err());
        assert!(ConversationCommand::resolve(&store, Some(0)).is_err());
    }

    #[test]
    fn test_list_counts_live_messages() {
        let mut store = SessionStore::new();
        store.append_message(Message::user("Hello"));
        let text = ConversationCommand::list_text(&store);
        assert!(text.contains("  1. New Chat (1 messages) *"));
    }

    #[test]
    fn test_transcript_labels_speakers() {
        let text = ConversationCommand::transcript(&[
            Message::user("Hi"),
            Message::assistant("Hello!"),
        ]);
        assert_eq!(text, "you: Hi\n\noji: Hello!\n\n");
    }
}
