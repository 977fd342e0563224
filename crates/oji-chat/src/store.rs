//! Session store: the conversation set, the active selection and the live buffer.
//!
//! The active conversation's messages live in `live` while it is displayed;
//! its entry in `conversations` is only brought up to date when the selection
//! moves away. Every method that changes the selection reconciles first, so
//! nothing written to the live buffer is lost.

use std::sync::Arc;

use oji_ai::Message;
use parking_lot::Mutex;

use crate::conversation::{Conversation, ConversationId, derive_display_name};

/// A store shared between the orchestrator and the frontend
pub type SharedStore = Arc<Mutex<SessionStore>>;

/// Owns every conversation of the running session.
#[derive(Debug)]
pub struct SessionStore {
    /// Conversations in creation order
    conversations: Vec<Conversation>,
    active: ConversationId,
    /// Messages of the active conversation
    live: Vec<Message>,
    next_id: u64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a store holding a single empty "New Chat"
    pub fn new() -> Self {
        let first = Conversation::new(ConversationId(1));
        Self {
            active: first.id,
            conversations: vec![first],
            live: Vec::new(),
            next_id: 2,
        }
    }

    /// Wrap in an `Arc<Mutex<_>>` for sharing
    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    fn allocate_id(&mut self) -> ConversationId {
        let id = ConversationId(self.next_id);
        self.next_id += 1;
        id
    }

    fn index_of(&self, id: ConversationId) -> Option<usize> {
        self.conversations.iter().position(|c| c.id == id)
    }

    /// Copy the live buffer into the active conversation's stored history.
    fn sync_active(&mut self) {
        if let Some(idx) = self.index_of(self.active) {
            self.conversations[idx].messages = self.live.clone();
        }
    }

    // ---- Readers ----

    pub fn active_id(&self) -> ConversationId {
        self.active
    }

    /// Messages of the active conversation
    pub fn live_messages(&self) -> &[Message] {
        &self.live
    }

    /// Conversations in creation order. Stored messages of the active one may
    /// lag behind the live buffer; use [`messages_of`](Self::messages_of).
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.index_of(id).is_some()
    }

    /// Current messages of any conversation, live or stored
    pub fn messages_of(&self, id: ConversationId) -> Option<&[Message]> {
        if id == self.active {
            Some(&self.live)
        } else {
            self.get(id).map(|c| c.messages.as_slice())
        }
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    // ---- Conversation lifecycle ----

    /// Add an empty "New Chat" and make it active
    pub fn create_conversation(&mut self) -> ConversationId {
        self.sync_active();
        let id = self.allocate_id();
        self.conversations.push(Conversation::new(id));
        self.active = id;
        self.live.clear();
        tracing::debug!(%id, "Created conversation");
        id
    }

    /// Make `id` active. Returns false if it does not exist.
    ///
    /// Switching to the already-active conversation does nothing at all.
    pub fn switch_to(&mut self, id: ConversationId) -> bool {
        if id == self.active {
            return true;
        }
        let Some(target) = self.index_of(id) else {
            return false;
        };

        self.sync_active();
        self.live = self.conversations[target].messages.clone();
        self.active = id;
        tracing::debug!(%id, "Switched conversation");
        true
    }

    /// Explicitly rename a conversation; it is no longer auto-named
    pub fn rename(&mut self, id: ConversationId, name: impl Into<String>) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let conversation = &mut self.conversations[idx];
        conversation.display_name = name.into();
        conversation.renamed = true;
        true
    }

    /// Copy a conversation under a new id without switching to it
    pub fn duplicate(&mut self, id: ConversationId) -> Option<ConversationId> {
        let source = self.index_of(id)?;
        let messages = if id == self.active {
            self.live.clone()
        } else {
            self.conversations[source].messages.clone()
        };
        let name = format!("{} (Copy)", self.conversations[source].display_name);
        let renamed = self.conversations[source].renamed;

        let new_id = self.allocate_id();
        let mut copy = Conversation::named(new_id, name);
        copy.messages = messages;
        copy.renamed = renamed;
        self.conversations.push(copy);
        tracing::debug!(from = %id, to = %new_id, "Duplicated conversation");
        Some(new_id)
    }

    /// Remove a conversation. The last remaining one cannot be deleted.
    ///
    /// Deleting the active conversation selects the first remaining one.
    pub fn delete(&mut self, id: ConversationId) -> bool {
        if self.conversations.len() <= 1 {
            tracing::debug!(%id, "Refusing to delete the last conversation");
            return false;
        }
        let Some(idx) = self.index_of(id) else {
            return false;
        };

        self.conversations.remove(idx);
        if id == self.active {
            let first = &self.conversations[0];
            self.active = first.id;
            self.live = first.messages.clone();
        }
        tracing::debug!(%id, "Deleted conversation");
        true
    }

    /// Set the display name from the first user message unless the
    /// conversation already has messages or was renamed by hand.
    pub fn auto_name(&mut self, id: ConversationId, first_message: &str) -> bool {
        let is_empty = self.messages_of(id).is_some_and(|m| m.is_empty());
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let conversation = &mut self.conversations[idx];
        if !is_empty || conversation.renamed {
            return false;
        }
        let name = derive_display_name(first_message);
        if name.is_empty() {
            return false;
        }
        conversation.display_name = name;
        true
    }

    // ---- Message mutation ----

    /// Append a completed message to the active conversation
    pub fn append_message(&mut self, message: Message) {
        self.live.push(message);
    }

    /// Mutate the last message of the active conversation in place
    pub fn mutate_last_message<F: FnOnce(&mut Message)>(&mut self, f: F) -> bool {
        match self.live.last_mut() {
            Some(message) => {
                f(message);
                true
            }
            None => false,
        }
    }

    fn messages_mut(&mut self, id: ConversationId) -> Option<&mut Vec<Message>> {
        if id == self.active {
            Some(&mut self.live)
        } else {
            let idx = self.index_of(id)?;
            Some(&mut self.conversations[idx].messages)
        }
    }

    /// Append to conversation `id`, wherever its messages currently live.
    /// Returns false if the conversation no longer exists.
    pub fn append_message_to(&mut self, id: ConversationId, message: Message) -> bool {
        match self.messages_mut(id) {
            Some(messages) => {
                messages.push(message);
                true
            }
            None => false,
        }
    }

    /// Mutate the last message of conversation `id`, wherever it lives.
    pub fn mutate_last_message_in<F: FnOnce(&mut Message)>(
        &mut self,
        id: ConversationId,
        f: F,
    ) -> bool {
        match self.messages_mut(id).and_then(|m| m.last_mut()) {
            Some(message) => {
                f(message);
                true
            }
            None => false,
        }
    }
}
