//! Core types for chat interactions

use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a wire role, if known
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// An image attached to a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub display_name: String,
    /// Always "image" for now
    pub mime_kind: String,
    /// Full MIME type, e.g. "image/png"
    pub mime_type: String,
    /// Base64 data, optionally wrapped in a `data:<mime>;base64,` URI
    pub payload: String,
    pub byte_size: u64,
}

impl Attachment {
    /// Create an image attachment from an already-encoded payload
    pub fn image(
        display_name: impl Into<String>,
        mime_type: impl Into<String>,
        payload: impl Into<String>,
        byte_size: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: display_name.into(),
            mime_kind: "image".to_string(),
            mime_type: mime_type.into(),
            payload: payload.into(),
            byte_size,
        }
    }

    /// Encode raw image bytes as a data URI attachment
    pub fn from_bytes(
        display_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: &[u8],
    ) -> Self {
        let mime_type = mime_type.into();
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let payload = format!("data:{};base64,{}", mime_type, encoded);
        Self::image(display_name, mime_type, payload, bytes.len() as u64)
    }

    /// The payload with any data-URI prefix removed
    pub fn base64_data(&self) -> &str {
        if self.payload.starts_with("data:") {
            if let Some((_, data)) = self.payload.split_once(";base64,") {
                return data;
            }
        }
        &self.payload
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            attachments: vec![],
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a user message with text content
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a user message carrying image attachments
    pub fn user_with_attachments(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            attachments,
            ..Self::new(Role::User, content)
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an empty assistant message (streaming placeholder)
    pub fn assistant_empty() -> Self {
        Self::new(Role::Assistant, String::new())
    }

    /// Append streamed text
    pub fn push_str(&mut self, delta: &str) {
        self.content.push_str(delta);
    }
}

/// A model advertised by the `/models` endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owned_by: None,
        }
    }
}

/// Everything needed to issue one chat completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// System prompt, sent first when non-blank
    pub system_prompt: Option<String>,
    /// Conversation history including the new user message
    pub messages: Vec<Message>,
    /// Upper bound on generated tokens
    pub max_completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_names() {
        for role in [Role::System, Role::User, Role::Assistant] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("tool"), None);
    }

    #[test]
    fn test_attachment_from_bytes_is_data_uri() {
        let a = Attachment::from_bytes("dot.png", "image/png", b"abc");
        assert_eq!(a.mime_kind, "image");
        assert_eq!(a.byte_size, 3);
        assert_eq!(a.payload, "data:image/png;base64,YWJj");
        assert_eq!(a.base64_data(), "YWJj");
    }

    #[test]
    fn test_base64_data_without_prefix() {
        let a = Attachment::image("x.jpg", "image/jpeg", "QUJD", 3);
        assert_eq!(a.base64_data(), "QUJD");
    }

    #[test]
    fn test_attachment_ids_are_unique() {
        let a = Attachment::image("a", "image/png", "", 0);
        let b = Attachment::image("a", "image/png", "", 0);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_message_serialization_skips_empty_attachments() {
        let msg = Message::user("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert!(json.get("attachments").is_none());
    }

    #[test]
    fn test_push_str_appends() {
        let mut msg = Message::assistant_empty();
        msg.push_str("Hel");
        msg.push_str("lo");
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.role, Role::Assistant);
    }
}
