//! Request orchestration: from user input to a finished assistant message

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use oji_ai::{Attachment, ChatClient, ChatRequest, Message, ModelDescriptor, Transport};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    conversation::ConversationId,
    error::{Error, Result},
    events::ChatEvent,
    handle::ChatHandle,
    store::SharedStore,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:9068/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_MAX_COMPLETION_TOKENS: u32 = 8192;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings consumed by the chat core
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Endpoint root, e.g. `http://localhost:9068/v1`
    pub base_url: String,
    pub api_key: Option<String>,
    /// Request server-sent events instead of a buffered body
    pub stream: bool,
    pub system_prompt: Option<String>,
    pub max_completion_tokens: u32,
    /// Selected model id
    pub model: String,
    /// Models reported by the last committed probe
    pub available_models: Vec<ModelDescriptor>,
    pub probe_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            stream: true,
            system_prompt: None,
            max_completion_tokens: DEFAULT_MAX_COMPLETION_TOKENS,
            model: DEFAULT_MODEL.to_string(),
            available_models: Vec::new(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl ChatConfig {
    /// Build a client for this endpoint over `transport`
    pub fn client(&self, transport: Arc<dyn Transport>) -> ChatClient {
        ChatClient::new(transport, &self.base_url, self.api_key.clone())
    }

    /// Options for the next request
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            model: self.model.clone(),
            stream: self.stream,
            system_prompt: self.system_prompt.clone(),
            max_completion_tokens: self.max_completion_tokens,
        }
    }

    /// Adopt models discovered by a probe.
    ///
    /// The selected model is kept if the server still offers it, otherwise
    /// the first discovered model is selected.
    pub fn commit_models(&mut self, models: Vec<ModelDescriptor>) {
        if !models.is_empty() && !models.iter().any(|m| m.id == self.model) {
            tracing::debug!(from = %self.model, to = %models[0].id, "Selected model not offered, switching");
            self.model = models[0].id.clone();
        }
        self.available_models = models;
    }
}

/// Per-request settings
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub model: String,
    pub stream: bool,
    pub system_prompt: Option<String>,
    pub max_completion_tokens: u32,
}

impl Default for RequestOptions {
    fn default() -> Self {
        ChatConfig::default().request_options()
    }
}

/// What became of a `send`
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// Nothing to send
    Skipped,
    /// The assistant reply as stored in the conversation
    Completed { message: Message },
}

/// Drives chat requests against the shared store
pub struct Orchestrator {
    client: ChatClient,
    store: SharedStore,
    event_tx: broadcast::Sender<ChatEvent>,
    handle: ChatHandle,
}

impl Orchestrator {
    pub fn new(client: ChatClient, store: SharedStore) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            client,
            store,
            event_tx,
            handle: ChatHandle::new(),
        }
    }

    /// Subscribe to chat events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Get a cloneable handle for cancelling from outside.
    pub fn handle(&self) -> ChatHandle {
        self.handle.clone()
    }

    /// Cancel the running request
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Send `input` to conversation `conversation_id` and fold the reply into it.
    ///
    /// Errors are emitted as [`ChatEvent::Error`] before being returned, except
    /// cancellation, which is returned quietly. Partial output stays in place
    /// either way.
    ///
    /// One request runs at a time: a send while another is running returns
    /// [`Error::Busy`] without touching the store or emitting events.
    pub async fn send(
        &self,
        conversation_id: ConversationId,
        input: &str,
        attachments: Vec<Attachment>,
        options: &RequestOptions,
    ) -> Result<SendOutcome> {
        if input.trim().is_empty() && attachments.is_empty() {
            tracing::debug!("Nothing to send");
            return Ok(SendOutcome::Skipped);
        }

        let user_message = if attachments.is_empty() {
            Message::user(input)
        } else {
            Message::user_with_attachments(input, attachments)
        };

        let Some(cancel) = self.handle.begin() else {
            tracing::debug!(%conversation_id, "Rejecting send while another request runs");
            return Err(Error::Busy);
        };
        self.emit(ChatEvent::RequestStart { conversation_id });

        let history = {
            let mut store = self.store.lock();
            store.auto_name(conversation_id, input);
            if store.append_message_to(conversation_id, user_message.clone()) {
                store.messages_of(conversation_id).map(|m| m.to_vec())
            } else {
                None
            }
        };

        let result = match history {
            Some(messages) => {
                self.emit(ChatEvent::MessageAppended {
                    conversation_id,
                    message: user_message,
                });
                let request = ChatRequest {
                    model: options.model.clone(),
                    system_prompt: options.system_prompt.clone(),
                    messages,
                    max_completion_tokens: options.max_completion_tokens,
                };
                tracing::debug!(
                    %conversation_id,
                    model = %request.model,
                    stream = options.stream,
                    history = request.messages.len(),
                    "Sending chat request"
                );
                if options.stream {
                    self.run_streaming(conversation_id, &request, cancel).await
                } else {
                    self.run_buffered(conversation_id, &request, cancel).await
                }
            }
            None => Err(Error::UnknownConversation(conversation_id)),
        };

        match &result {
            Ok(_) => tracing::debug!(%conversation_id, "Chat request finished"),
            Err(e) if e.is_silent() => tracing::debug!(%conversation_id, "Chat request cancelled"),
            Err(e) => {
                let classified = e.classify();
                tracing::warn!(%conversation_id, error = %e, "Chat request failed");
                self.emit(ChatEvent::Error {
                    conversation_id,
                    title: classified.title,
                    detail: classified.detail,
                });
            }
        }

        self.emit(ChatEvent::RequestEnd { conversation_id });
        self.handle.finish();

        result.map(|message| SendOutcome::Completed { message })
    }

    async fn run_buffered(
        &self,
        conversation_id: ConversationId,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<Message> {
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(oji_ai::Error::Cancelled.into()),
            reply = self.client.complete(request, cancel.clone()) => reply?,
        };

        if self
            .store
            .lock()
            .append_message_to(conversation_id, reply.clone())
        {
            self.emit(ChatEvent::MessageAppended {
                conversation_id,
                message: reply.clone(),
            });
        } else {
            tracing::debug!(%conversation_id, "Conversation deleted before the reply arrived");
        }
        Ok(reply)
    }

    async fn run_streaming(
        &self,
        conversation_id: ConversationId,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<Message> {
        let mut reply = Message::assistant_empty();
        if !self
            .store
            .lock()
            .append_message_to(conversation_id, reply.clone())
        {
            return Err(Error::UnknownConversation(conversation_id));
        }
        self.emit(ChatEvent::MessageAppended {
            conversation_id,
            message: reply.clone(),
        });

        let mut deltas = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(oji_ai::Error::Cancelled.into()),
            stream = self.client.stream(request, cancel.clone()) => stream?,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(oji_ai::Error::Cancelled.into()),
                next = deltas.next() => next,
            };
            let Some(delta) = next else { break };
            let delta = delta?;

            reply.push_str(delta.as_str());
            let folded = self
                .store
                .lock()
                .mutate_last_message_in(conversation_id, |m| m.push_str(delta.as_str()));
            if !folded {
                tracing::debug!(%conversation_id, "Conversation deleted mid-stream, dropping the rest");
                return Ok(reply);
            }
            self.emit(ChatEvent::MessageUpdated {
                conversation_id,
                delta: delta.into_string(),
                message: reply.clone(),
            });
        }

        Ok(reply)
    }
}
