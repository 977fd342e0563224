//! OpenAI-compatible chat completions client

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    sse::{ContentDelta, DeltaStream, decode_stream},
    transport::{HttpRequest, Response, Transport},
    types::{ChatRequest, Message, ModelDescriptor, Role},
};

/// Client for an OpenAI-compatible endpoint
#[derive(Clone)]
pub struct ChatClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    api_key: Option<String>,
}

impl ChatClient {
    /// Create a client for `base_url` (e.g. `http://localhost:9068/v1`)
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            transport,
            base_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.base_url)
    }

    fn chat_request(&self, request: &ChatRequest, stream: bool) -> Result<HttpRequest> {
        if self.base_url.is_empty() {
            return Err(Error::InvalidConfig("base URL is empty".to_string()));
        }
        let body = serde_json::to_value(build_request(request, stream))?;
        Ok(HttpRequest::post_json(self.chat_url(), body)
            .with_bearer(self.api_key.as_deref())
            .with_stream(stream))
    }

    /// Request a single buffered completion
    pub async fn complete(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<Message> {
        let http = self.chat_request(request, false)?;
        match self.transport.send(http, cancel).await? {
            Response::Buffered(body) => parse_completion(&body.text),
            Response::Stream(_) => Err(Error::UnexpectedResponse(
                "expected a buffered body".to_string(),
            )),
        }
    }

    /// Request a streamed completion and decode it into deltas
    pub async fn stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<DeltaStream> {
        let http = self.chat_request(request, true)?;
        match self.transport.send(http, cancel).await? {
            Response::Stream(bytes) => Ok(decode_stream(bytes)),
            Response::Buffered(body) => {
                // Some servers ignore `stream: true`; replay the whole reply as one delta
                let message = parse_completion(&body.text)?;
                let delta = Some(message.content)
                    .filter(|c| !c.is_empty())
                    .map(|c| Ok(ContentDelta(c)));
                Ok(Box::pin(futures::stream::iter(delta)))
            }
        }
    }

    /// List available models; doubles as a reachability and credential check
    pub async fn list_models(
        &self,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<Vec<ModelDescriptor>> {
        if self.base_url.is_empty() {
            return Err(Error::InvalidConfig("base URL is empty".to_string()));
        }
        let body = self
            .transport
            .probe(&self.models_url(), self.api_key.as_deref(), deadline, cancel)
            .await?;
        let list: ModelList = body.json()?;
        Ok(list.data)
    }
}

fn build_request(request: &ChatRequest, stream: bool) -> CompletionRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(prompt) = request
        .system_prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
    {
        messages.push(WireMessage {
            role: Role::System.as_str(),
            content: WireContent::Text(prompt.to_string()),
        });
    }

    messages.extend(request.messages.iter().map(convert_message));

    CompletionRequest {
        model: request.model.clone(),
        messages,
        stream,
        max_completion_tokens: request.max_completion_tokens,
    }
}

fn convert_message(msg: &Message) -> WireMessage {
    let content = if msg.attachments.is_empty() {
        WireContent::Text(msg.content.clone())
    } else {
        let mut parts = Vec::with_capacity(msg.attachments.len() + 1);
        parts.push(ContentPart::Text {
            text: msg.content.clone(),
        });
        parts.extend(msg.attachments.iter().map(|a| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: a.base64_data().to_string(),
            },
        }));
        WireContent::Parts(parts)
    };

    WireMessage {
        role: msg.role.as_str(),
        content,
    }
}

fn parse_completion(text: &str) -> Result<Message> {
    let response: CompletionResponse = serde_json::from_str(text)?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::UnexpectedResponse("response contained no choices".to_string()))?;

    let role = choice
        .message
        .role
        .as_deref()
        .and_then(Role::parse)
        .unwrap_or(Role::Assistant);

    Ok(Message {
        role,
        ..Message::assistant(choice.message.content.unwrap_or_default())
    })
}

// Request/Response types

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    max_completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: WireContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpTransport;
    use crate::types::Attachment;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(messages: Vec<Message>, system: Option<&str>) -> ChatRequest {
        ChatRequest {
            model: "gpt-3.5-turbo".into(),
            system_prompt: system.map(str::to_string),
            messages,
            max_completion_tokens: 8192,
        }
    }

    fn client(server: &MockServer, key: Option<&str>) -> ChatClient {
        ChatClient::new(
            Arc::new(HttpTransport::new()),
            format!("{}/v1/", server.uri()),
            key.map(str::to_string),
        )
    }

    #[test]
    fn test_build_request_plain() {
        let req = request(vec![Message::user("Hello")], Some("Be brief"));
        let json = serde_json::to_value(build_request(&req, true)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": "Be brief"},
                    {"role": "user", "content": "Hello"}
                ],
                "stream": true,
                "max_completion_tokens": 8192
            })
        );
    }

    #[test]
    fn test_blank_system_prompt_omitted() {
        let req = request(vec![Message::user("Hi")], Some("   "));
        let json = serde_json::to_value(build_request(&req, false)).unwrap();
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_attachments_become_parts() {
        let msg = Message::user_with_attachments(
            "What is this?",
            vec![
                Attachment::from_bytes("a.png", "image/png", b"abc"),
                Attachment::image("b.jpg", "image/jpeg", "QUJD", 3),
            ],
        );
        let json = serde_json::to_value(convert_message(&msg)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "What is this?"},
                    {"type": "image_url", "image_url": {"url": "YWJj"}},
                    {"type": "image_url", "image_url": {"url": "QUJD"}}
                ]
            })
        );
    }

    #[test]
    fn test_parse_completion() {
        let msg = parse_completion(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Hi there"}}]}"#,
        )
        .unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "Hi there");
    }

    #[test]
    fn test_parse_completion_without_choices() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn test_complete_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-1"))
            .and(body_partial_json(serde_json::json!({"stream": false, "model": "gpt-3.5-turbo"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"choices":[{"message":{"role":"assistant","content":"pong"}}]}"#,
            ))
            .mount(&server)
            .await;

        let msg = client(&server, Some("sk-1"))
            .complete(&request(vec![Message::user("ping")], None), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(msg.content, "pong");
    }

    #[tokio::test]
    async fn test_stream_round_trip() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let mut deltas = client(&server, None)
            .stream(&request(vec![Message::user("hi")], None), CancellationToken::new())
            .await
            .unwrap();

        let mut text = String::new();
        while let Some(delta) = deltas.next().await {
            text.push_str(delta.unwrap().as_str());
        }
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"object":"list","data":[{"id":"llama-3","owned_by":"me"},{"id":"qwen"}]}"#,
            ))
            .mount(&server)
            .await;

        let models = client(&server, None)
            .list_models(Duration::from_secs(5), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            models,
            vec![
                ModelDescriptor {
                    id: "llama-3".into(),
                    owned_by: Some("me".into())
                },
                ModelDescriptor::new("qwen"),
            ]
        );
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let client = ChatClient::new(Arc::new(HttpTransport::new()), "", None);
        let err = client
            .chat_request(&request(vec![Message::user("x")], None), false)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
