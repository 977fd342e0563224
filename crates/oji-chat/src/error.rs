//! Error types for oji-chat

use thiserror::Error;

use crate::conversation::ConversationId;

/// Result type alias using oji-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a chat request
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the transport/provider layer
    #[error(transparent)]
    Ai(#[from] oji_ai::Error),

    /// The target conversation does not exist (or was deleted mid-request)
    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),

    /// Another request is still running on this orchestrator
    #[error("A request is already in progress")]
    Busy,
}

impl Error {
    /// Whether this error is a deliberate cancellation that must not be shown
    pub fn is_silent(&self) -> bool {
        match self {
            Error::Ai(e) => e.is_silent(),
            _ => false,
        }
    }

    /// Title and detail for presentation
    pub fn classify(&self) -> oji_ai::ClassifiedError {
        match self {
            Error::Ai(e) => e.classify(),
            Error::UnknownConversation(_) => oji_ai::ClassifiedError {
                kind: oji_ai::ErrorKind::InvalidConfig,
                status: None,
                title: "Conversation not found".to_string(),
                detail: self.to_string(),
            },
            Error::Busy => oji_ai::ClassifiedError {
                kind: oji_ai::ErrorKind::InvalidConfig,
                status: None,
                title: "Request in progress".to_string(),
                detail: self.to_string(),
            },
        }
    }
}
